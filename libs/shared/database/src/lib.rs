pub mod supabase;

pub use supabase::{PostgrestError, SupabaseClient};
