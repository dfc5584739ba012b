pub mod backend;
pub mod chat;
pub mod db;
pub mod local;
pub mod models;
pub mod pantry;
pub mod supabase;
pub mod toast;

#[cfg(test)]
mod testing;
