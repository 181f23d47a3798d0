//! Conciliation Service - groups invoices and payments of a customer or
//! supplier into conciliation sets tracked on the ERP documents themselves.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
