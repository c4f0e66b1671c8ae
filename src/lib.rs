pub mod api;
pub mod common;
pub mod config;
pub mod db;
pub mod entity;
pub mod migration;
pub mod model;
pub mod util;
pub mod web;
