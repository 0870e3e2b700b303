pub mod absence;
