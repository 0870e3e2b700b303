pub mod absence_service;
