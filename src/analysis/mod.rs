pub mod align;
pub mod bars;
pub mod compare;
pub mod spurts;
