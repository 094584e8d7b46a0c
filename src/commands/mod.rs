pub mod cache;
pub mod capture;
pub mod generate;
pub mod history;
pub mod resolve;
pub mod run;
pub mod step;
pub mod utils;
