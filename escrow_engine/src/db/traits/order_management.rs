use crate::{
    db::traits::{EscrowDatabase, FulfillmentUpdate, InsertOrderResult},
    db_types::{NewOrder, Order, OrderId, OrderStatusType, PaymentStatus},
};

/// The `OrderManagement` trait defines the behaviour for storing and querying orders in the database backend.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: EscrowDatabase {
    /// Stores a new order with `status = pending` and `payment_status = paid`. If an order with the same `order_id`
    /// already exists, it is returned unchanged as [`InsertOrderResult::AlreadyExists`].
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error>;

    /// Fetches all orders with the given fulfillment and payment status, oldest first.
    async fn fetch_orders_with_status(
        &self,
        status: OrderStatusType,
        payment_status: PaymentStatus,
    ) -> Result<Vec<Order>, Self::Error>;

    /// Applies the fulfillment update if, and only if, the order's current status is in `update.from`.
    ///
    /// Returns the updated order, or `None` if no row matched (the order does not exist, or its status did not permit
    /// the transition).
    async fn update_fulfillment_status(
        &self,
        order_id: &OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Option<Order>, Self::Error>;
}
