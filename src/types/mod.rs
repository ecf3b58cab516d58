pub mod date_range;
pub mod location;
pub mod observation;
pub mod search_term;
