pub mod location_catalog;
