//! This module defines the core data structures used across the search sync engine.

pub mod document;
pub mod mapping;
pub mod search_query;
pub mod search_result;
