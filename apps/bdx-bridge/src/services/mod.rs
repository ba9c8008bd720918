pub mod bdx;
pub mod notifier;
pub mod query;
pub mod report;
pub mod reshape;
pub mod sankey;
