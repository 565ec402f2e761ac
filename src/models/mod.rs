pub mod enums;
pub mod document;
pub mod review_item;
pub mod template;
pub mod work_order;

pub use document::*;
pub use review_item::*;
pub use template::*;
pub use work_order::*;
