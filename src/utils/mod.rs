pub mod db_utils;
pub mod invalidation;
pub mod listing;
pub mod validation;
