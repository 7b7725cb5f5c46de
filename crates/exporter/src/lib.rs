//! VMware guest exporter HTTP surface and configuration

pub mod api;
pub mod config;
