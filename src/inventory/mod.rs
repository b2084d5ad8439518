use serde::Deserialize;
use sqlx::{Pool, Sqlite};

use crate::{
    db::{models::Product, queries},
    delivery::Delivery,
    error::{AppError, AppResult},
};

pub const MAX_ORDER_LINES: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub code: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub first_name: String,
    pub last_name: String,
    pub shipping_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub products: Vec<OrderLine>,
}

/// Employee storefront stock and orders.
#[derive(Clone)]
pub struct Inventory {
    pool: Pool<Sqlite>,
    delivery: Delivery,
}

impl Inventory {
    pub fn new(pool: Pool<Sqlite>, delivery: Delivery) -> Self {
        Self { pool, delivery }
    }

    pub async fn list(&self) -> AppResult<Vec<Product>> {
        Ok(queries::list_products(&self.pool).await?)
    }

    pub async fn list_available(&self) -> AppResult<Vec<Product>> {
        Ok(queries::list_available_products(&self.pool).await?)
    }

    pub async fn add(&self, code: &str, quantity: i64) -> AppResult<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::Validation("productCode is required".to_string()));
        }
        if quantity < 0 {
            return Err(AppError::Validation("quantity must not be negative".to_string()));
        }
        if !queries::insert_product(&self.pool, code, quantity).await? {
            return Err(AppError::Validation("Product code already exists".to_string()));
        }
        tracing::info!(product_code = code, quantity, "product added");
        Ok(())
    }

    pub async fn delete(&self, code: &str) -> AppResult<()> {
        if !queries::delete_product(&self.pool, code).await? {
            return Err(AppError::NotFound("product"));
        }
        tracing::info!(product_code = code, "product deleted");
        Ok(())
    }

    pub async fn set_quantity(&self, code: &str, quantity: i64) -> AppResult<Product> {
        if quantity < 0 {
            return Err(AppError::Validation("quantity must not be negative".to_string()));
        }
        queries::set_product_quantity(&self.pool, code, quantity)
            .await?
            .ok_or(AppError::NotFound("product"))
    }

    /// Places an order, taking stock for every line in one transaction.
    pub async fn place_order(&self, order: &NewOrder) -> AppResult<i64> {
        if order.first_name.trim().is_empty()
            || order.last_name.trim().is_empty()
            || order.shipping_address.trim().is_empty()
        {
            return Err(AppError::Validation(
                "firstName, lastName and shippingAddress are required".to_string(),
            ));
        }
        if order.products.is_empty() {
            return Err(AppError::Validation("at least one product is required".to_string()));
        }
        if order.products.len() > MAX_ORDER_LINES {
            return Err(AppError::Validation(format!(
                "Maximum {MAX_ORDER_LINES} products allowed"
            )));
        }
        if let Some(line) = order.products.iter().find(|l| l.quantity < 1) {
            return Err(AppError::Validation(format!(
                "quantity for {} must be at least 1",
                line.code
            )));
        }

        let mut tx = self.pool.begin().await?;

        // Write before any read so the transaction holds the write lock from its first statement
        for line in &order.products {
            if !queries::decrement_product_quantity(&mut *tx, &line.code, line.quantity).await? {
                let reason = match queries::get_product(&mut *tx, &line.code).await? {
                    Some(_) => format!("Insufficient quantity available for {}", line.code),
                    None => format!("Product {} not found", line.code),
                };
                return Err(AppError::Validation(reason));
            }
        }

        let notes = order.notes.as_deref().filter(|n| !n.trim().is_empty());
        let order_id = queries::insert_order(
            &mut *tx,
            order.first_name.trim(),
            order.last_name.trim(),
            order.shipping_address.trim(),
            notes,
        )
        .await?;

        for line in &order.products {
            queries::insert_order_item(&mut *tx, order_id, &line.code, line.quantity).await?;
        }

        tx.commit().await?;
        tracing::info!(order_id, lines = order.products.len(), "order placed");

        let lines: Vec<String> = order
            .products
            .iter()
            .map(|l| format!("{}: {}", l.code, l.quantity))
            .collect();
        let body = format!(
            "Order #{order_id}\nFrom: {} {}\nShipping Address: {}\n\nProducts:\n{}\n\nNotes: {}",
            order.first_name,
            order.last_name,
            order.shipping_address,
            lines.join("\n"),
            notes.unwrap_or("None"),
        );
        if let Err(e) = self
            .delivery
            .email(&format!("New Employee Order #{order_id}"), &body)
            .await
        {
            tracing::warn!(order_id, error = %e, "order notification not sent");
        }

        Ok(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        delivery::{Channel, testing::RecordingNotifier},
    };

    async fn inventory() -> (Inventory, std::sync::Arc<RecordingNotifier>) {
        let email = RecordingNotifier::new(Channel::Email);
        let delivery = Delivery::new(
            RecordingNotifier::new(Channel::Sms),
            "",
            email.clone(),
            "ops@example.com",
        );
        (Inventory::new(test_pool().await, delivery), email)
    }

    fn order(lines: &[(&str, i64)]) -> NewOrder {
        NewOrder {
            first_name: "Katherine".to_string(),
            last_name: "Johnson".to_string(),
            shipping_address: "1 Langley Blvd".to_string(),
            notes: None,
            products: lines
                .iter()
                .map(|(code, quantity)| OrderLine {
                    code: code.to_string(),
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_product_admin() {
        let (inv, _) = inventory().await;
        inv.add("TSHIRT-M", 5).await.unwrap();
        inv.add("MUG", 0).await.unwrap();

        assert!(matches!(inv.add("MUG", 3).await, Err(AppError::Validation(_))));
        assert!(matches!(inv.add(" ", 3).await, Err(AppError::Validation(_))));

        assert_eq!(inv.list().await.unwrap().len(), 2);
        let available = inv.list_available().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].product_code, "TSHIRT-M");

        let updated = inv.set_quantity("MUG", 4).await.unwrap();
        assert_eq!(updated.available_quantity, 4);
        assert!(matches!(inv.set_quantity("NOPE", 4).await, Err(AppError::NotFound(_))));

        inv.delete("MUG").await.unwrap();
        assert!(matches!(inv.delete("MUG").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_order_decrements_stock_and_notifies() {
        let (inv, email) = inventory().await;
        inv.add("TSHIRT-M", 5).await.unwrap();
        inv.add("MUG", 2).await.unwrap();

        let order_id = inv.place_order(&order(&[("TSHIRT-M", 2), ("MUG", 2)])).await.unwrap();

        let products = inv.list().await.unwrap();
        let stock = |code: &str| {
            products
                .iter()
                .find(|p| p.product_code == code)
                .map(|p| p.available_quantity)
        };
        assert_eq!(stock("TSHIRT-M"), Some(3));
        assert_eq!(stock("MUG"), Some(0));

        let body = email.last_body().await.unwrap();
        assert!(body.contains(&format!("Order #{order_id}")));
        assert!(body.contains("MUG: 2"));
    }

    #[tokio::test]
    async fn test_failed_line_rolls_back_whole_order() {
        let (inv, email) = inventory().await;
        inv.add("TSHIRT-M", 5).await.unwrap();
        inv.add("MUG", 1).await.unwrap();

        let result = inv.place_order(&order(&[("TSHIRT-M", 2), ("MUG", 2)])).await;
        assert!(matches!(result, Err(AppError::Validation(msg)) if msg.contains("MUG")));

        let tshirt = inv.list().await.unwrap().into_iter().find(|p| p.product_code == "TSHIRT-M");
        assert_eq!(tshirt.map(|p| p.available_quantity), Some(5));
        assert!(email.sent.lock().await.is_empty());

        let unknown = inv.place_order(&order(&[("TSHIRT-M", 1), ("HAT", 1)])).await;
        assert!(matches!(unknown, Err(AppError::Validation(msg)) if msg.contains("HAT")));
    }

    #[tokio::test]
    async fn test_order_shape_rules() {
        let (inv, _) = inventory().await;
        for code in ["A", "B", "C", "D"] {
            inv.add(code, 10).await.unwrap();
        }

        let too_many = order(&[("A", 1), ("B", 1), ("C", 1), ("D", 1)]);
        assert!(matches!(inv.place_order(&too_many).await, Err(AppError::Validation(_))));

        let zero = order(&[("A", 0)]);
        assert!(matches!(inv.place_order(&zero).await, Err(AppError::Validation(_))));

        let empty = order(&[]);
        assert!(matches!(inv.place_order(&empty).await, Err(AppError::Validation(_))));
    }
}
