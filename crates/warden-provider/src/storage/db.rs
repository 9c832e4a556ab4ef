//! SQLite database for the Warden provider.

warden_core::define_database!(ProviderDatabase, "Provider database migrations complete");
