pub mod abbreviation;
pub mod confidence;
pub mod fuzzy;
pub mod normalize;
pub mod vector;
