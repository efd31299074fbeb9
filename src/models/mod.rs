pub mod card;
pub mod charge;
