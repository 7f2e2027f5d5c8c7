pub mod db;
pub mod error;
pub mod grocery;
pub mod images;
pub mod models;
pub mod normalize;
pub mod service;
pub mod spoonacular;
pub mod sync;
