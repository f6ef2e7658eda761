//! Integration tests for the Conservator client

mod config_layers;
mod dataset_sync;
mod pagination;
mod proxy_population;
mod staged_images;
mod test_utils;
