use sqlx::{Executor, Pool, Sqlite, SqliteConnection};

use crate::db::{
    models::{AuditEvent, CardRecord, PendingCode, Product},
    now_unix,
};

/// Row contents for a card submission; ciphertext fields are already encrypted.
#[derive(Debug, Clone)]
pub struct CardRow<'a> {
    pub customer_name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub company: &'a str,
    pub billing_address: &'a str,
    pub card_number_ciphertext: &'a str,
    pub cvv_ciphertext: &'a str,
    pub card_last_four: &'a str,
    pub expiry_date: &'a str,
    pub is_update: bool,
    pub idempotency_key: Option<&'a str>,
}

pub async fn insert_card_record<'e, E>(executor: E, row: &CardRow<'_>) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO card_records (customer_name, email, phone, company, billing_address,
         card_number_ciphertext, cvv_ciphertext, card_last_four, expiry_date,
         is_update, active, idempotency_key, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"
    )
    .bind(row.customer_name)
    .bind(row.email)
    .bind(row.phone)
    .bind(row.company)
    .bind(row.billing_address)
    .bind(row.card_number_ciphertext)
    .bind(row.cvv_ciphertext)
    .bind(row.card_last_four)
    .bind(row.expiry_date)
    .bind(row.is_update)
    .bind(row.idempotency_key)
    .bind(now_unix())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_card_id_by_idempotency_key<'e, E>(
    executor: E,
    key: &str,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM card_records WHERE idempotency_key = ?"
    )
    .bind(key)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(id,)| id))
}

pub async fn get_card_record<'e, E>(executor: E, id: i64) -> Result<Option<CardRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, CardRecord>("SELECT * FROM card_records WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn list_card_records(pool: &Pool<Sqlite>) -> Result<Vec<CardRecord>, sqlx::Error> {
    sqlx::query_as::<_, CardRecord>("SELECT * FROM card_records ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

/// Deletes a card and every verification code issued for it.
pub async fn delete_card_record(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query("DELETE FROM verification_codes WHERE card_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM card_records WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks every unused code for the subject as used. `card_id` is `None` for
/// admin login codes.
pub async fn retire_pending_codes<'e, E>(executor: E, card_id: Option<i64>) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE verification_codes SET used = 1 WHERE card_id IS ? AND used = 0")
        .bind(card_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

pub async fn insert_verification_code<'e, E>(
    executor: E,
    card_id: Option<i64>,
    code_hash: &str,
    expires_at: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO verification_codes (card_id, code_hash, expires_at, used, created_at)
         VALUES (?, ?, ?, 0, ?)"
    )
    .bind(card_id)
    .bind(code_hash)
    .bind(expires_at)
    .bind(now_unix())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn latest_pending_code<'e, E>(
    executor: E,
    card_id: Option<i64>,
) -> Result<Option<PendingCode>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, PendingCode>(
        "SELECT id, code_hash, expires_at FROM verification_codes
         WHERE card_id IS ? AND used = 0
         ORDER BY id DESC LIMIT 1"
    )
    .bind(card_id)
    .fetch_optional(executor)
    .await
}

/// Flips a code to used in a single statement. Returns false when another
/// caller got there first or the code no longer matches or has expired.
pub async fn consume_code<'e, E>(
    executor: E,
    id: i64,
    code_hash: &str,
    now: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE verification_codes SET used = 1
         WHERE id = ? AND used = 0 AND code_hash = ? AND expires_at > ?
         RETURNING id"
    )
    .bind(id)
    .bind(code_hash)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(row.is_some())
}

pub async fn purge_spent_codes<'e, E>(executor: E, now: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM verification_codes WHERE used = 1 OR expires_at <= ?")
        .bind(now)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

pub async fn insert_audit_event<'e, E>(
    executor: E,
    event_type: &str,
    actor: &str,
    target_id: Option<i64>,
    source_addr: &str,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO audit_events (event_type, actor, target_id, source_addr, created_at)
         VALUES (?, ?, ?, ?, ?)"
    )
    .bind(event_type)
    .bind(actor)
    .bind(target_id)
    .bind(source_addr)
    .bind(now_unix())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn list_audit_events(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<AuditEvent>, sqlx::Error> {
    sqlx::query_as::<_, AuditEvent>("SELECT * FROM audit_events ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn list_products(pool: &Pool<Sqlite>) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY product_code")
        .fetch_all(pool)
        .await
}

pub async fn list_available_products(pool: &Pool<Sqlite>) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE available_quantity > 0 ORDER BY product_code"
    )
    .fetch_all(pool)
    .await
}

/// Returns false when the product code is already taken.
pub async fn insert_product(pool: &Pool<Sqlite>, code: &str, quantity: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO products (product_code, available_quantity) VALUES (?, ?)
         ON CONFLICT (product_code) DO NOTHING"
    )
    .bind(code)
    .bind(quantity)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_product(pool: &Pool<Sqlite>, code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE product_code = ?")
        .bind(code)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_product_quantity(
    pool: &Pool<Sqlite>,
    code: &str,
    quantity: i64,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "UPDATE products SET available_quantity = ? WHERE product_code = ? RETURNING *"
    )
    .bind(quantity)
    .bind(code)
    .fetch_optional(pool)
    .await
}

pub async fn get_product<'e, E>(executor: E, code: &str) -> Result<Option<Product>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE product_code = ?")
        .bind(code)
        .fetch_optional(executor)
        .await
}

/// Takes `quantity` units out of stock; false when not enough are available.
pub async fn decrement_product_quantity(
    conn: &mut SqliteConnection,
    code: &str,
    quantity: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE products SET available_quantity = available_quantity - ?
         WHERE product_code = ? AND available_quantity >= ?"
    )
    .bind(quantity)
    .bind(code)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_order(
    conn: &mut SqliteConnection,
    first_name: &str,
    last_name: &str,
    shipping_address: &str,
    notes: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO orders (first_name, last_name, shipping_address, notes, created_at)
         VALUES (?, ?, ?, ?, ?)"
    )
    .bind(first_name)
    .bind(last_name)
    .bind(shipping_address)
    .bind(notes)
    .bind(now_unix())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_order_item(
    conn: &mut SqliteConnection,
    order_id: i64,
    code: &str,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_items (order_id, product_code, quantity) VALUES (?, ?, ?)")
        .bind(order_id)
        .bind(code)
        .bind(quantity)
        .execute(conn)
        .await?;

    Ok(())
}
