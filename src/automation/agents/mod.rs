pub mod extractor;
pub mod locator;
pub mod poster;
pub mod scroller;

pub use extractor::extract;
pub use locator::{locate, Located};
pub use poster::Sequencer;
pub use scroller::{run as scroll_extract, ScrollPlan};
