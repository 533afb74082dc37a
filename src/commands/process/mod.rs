mod classifier;
mod identity;
mod ledger;
mod merge;
mod pdf_store;
mod pipeline;
mod placement;
mod roster;
mod run;
mod segmenter;
mod text_extract;

pub use run::run;

pub(crate) use classifier::Classifier;
pub(crate) use ledger::{ItemStage, Ledger};
pub(crate) use pipeline::{discover_pending, source_page_count};
pub(crate) use segmenter::plan_page_groups;
