pub mod api;
pub mod db;
pub mod export;
pub mod import;
pub mod logging;
pub mod store;

pub mod util {
    pub mod env;
}
