pub mod history_api;
