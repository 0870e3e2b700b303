pub mod db_utils;
pub mod upload_store;
