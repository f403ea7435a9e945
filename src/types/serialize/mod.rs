pub mod array;
pub mod geo;
pub mod low_cardinality;
pub mod map;
pub mod nullable;
pub mod sized;
pub mod string;
pub mod tuple;

use super::*;
