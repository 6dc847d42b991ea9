use rusqlite::Connection;

/// Initialize the database schema. Safe to run on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- License keys (single-use secrets handed to customers)
        -- is_used = 1 exactly when used_by_email and used_at are both set
        CREATE TABLE IF NOT EXISTS license_keys (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            value TEXT NOT NULL UNIQUE,
            is_used INTEGER NOT NULL DEFAULT 0,
            used_by_email TEXT,
            used_at INTEGER,
            expiration_date INTEGER,
            purchase_intent_id TEXT,
            created_at INTEGER NOT NULL,

            CHECK (
                (is_used = 1 AND used_by_email IS NOT NULL AND used_at IS NOT NULL)
                OR (is_used = 0 AND used_by_email IS NULL AND used_at IS NULL)
            )
        );
        -- Claim picks the oldest available key per product
        CREATE INDEX IF NOT EXISTS idx_license_keys_available
            ON license_keys(product_id, created_at, id) WHERE is_used = 0;
        CREATE INDEX IF NOT EXISTS idx_license_keys_used
            ON license_keys(used_at) WHERE is_used = 1;
        CREATE INDEX IF NOT EXISTS idx_license_keys_intent
            ON license_keys(purchase_intent_id) WHERE purchase_intent_id IS NOT NULL;

        -- Purchase intents (immutable requests captured by the storefront)
        CREATE TABLE IF NOT EXISTS purchase_intents (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            product_title TEXT NOT NULL,
            country TEXT,
            email TEXT NOT NULL,
            phone_number TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_purchase_intents_created
            ON purchase_intents(created_at DESC);
        "#,
    )
}
