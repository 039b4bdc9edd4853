//! HTTP handlers for clickmark-server

pub mod auth;
pub mod health;
pub mod locations;
pub mod pages;
pub mod uploads;

pub use auth::{auth_routes, login, login_page, logout};
pub use health::health_routes;
pub use locations::{
    load_admin_locations, load_user_locations, location_routes, save_admin_locations,
    save_user_locations,
};
pub use pages::{demographics_page, index, page_routes, submit_demographics};
pub use uploads::upload_files;
