use std::time::Duration;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::OrmConn,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Entity as Orders, Model as OrderModel},
        users::{Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    mailer::{EmailMessage, MailError, Mailer},
};

const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub enum NotifyJob {
    OrderConfirmation {
        order_id: Uuid,
    },
    StatusUpdate {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub mail_from: String,
    pub max_attempts: u32,
    pub retry_base: Duration,
}

impl NotifyConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            mail_from: config.mail_from.clone(),
            max_attempts: config.email_max_attempts,
            retry_base: Duration::from_millis(config.email_retry_base_ms),
        }
    }
}

/// Handle to the email worker. Cloning shares the queue; enqueueing never
/// blocks the request path and a full queue drops the job with a warning.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotifyJob>,
}

impl Notifier {
    pub fn spawn(orm: OrmConn, mailer: Mailer, config: NotifyConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotifyJob>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                handle_job(&orm, &mailer, &config, job).await;
            }
            tracing::debug!("notification queue closed");
        });
        Notifier { tx }
    }

    pub fn enqueue(&self, job: NotifyJob) {
        if let Err(err) = self.tx.try_send(job) {
            tracing::warn!(error = %err, "failed to enqueue notification job");
        }
    }
}

async fn handle_job(orm: &OrmConn, mailer: &Mailer, config: &NotifyConfig, job: NotifyJob) {
    match job {
        NotifyJob::OrderConfirmation { order_id } => {
            if let Err(err) = send_confirmation(orm, mailer, config, order_id).await {
                tracing::error!(order_id = %order_id, error = %err, "order confirmation email failed");
            }
        }
        NotifyJob::StatusUpdate {
            order_id,
            old_status,
            new_status,
        } => {
            if let Err(err) =
                send_status_update(orm, mailer, config, order_id, &old_status, &new_status).await
            {
                tracing::error!(order_id = %order_id, error = %err, "status update email failed");
            }
        }
    }
}

async fn send_confirmation(
    orm: &OrmConn,
    mailer: &Mailer,
    config: &NotifyConfig,
    order_id: Uuid,
) -> AppResult<()> {
    let (order, user, items) = load_order_context(orm, order_id).await?;
    let email = compose_confirmation(&order, &user, &items);

    send_with_retry(mailer, config, &email)
        .await
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err.to_string())))?;

    let mut active: OrderActive = order.into();
    active.email_sent = Set(true);
    active.update(orm).await?;

    tracing::info!(order_id = %order_id, "order confirmation email sent");
    Ok(())
}

// Status-update mail is single-shot; a lost notification is acceptable.
async fn send_status_update(
    orm: &OrmConn,
    mailer: &Mailer,
    config: &NotifyConfig,
    order_id: Uuid,
    old_status: &str,
    new_status: &str,
) -> AppResult<()> {
    let (order, user, _items) = load_order_context(orm, order_id).await?;
    let email = compose_status_update(&order, &user, old_status, new_status);

    mailer
        .send(&config.mail_from, &email)
        .await
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err.to_string())))?;

    tracing::info!(order_id = %order_id, "status update email sent");
    Ok(())
}

/// Retries with exponential backoff (`retry_base × 2^attempt`) up to
/// `max_attempts` total sends.
pub async fn send_with_retry(
    mailer: &Mailer,
    config: &NotifyConfig,
    email: &EmailMessage,
) -> Result<(), MailError> {
    let mut attempt: u32 = 0;
    loop {
        match mailer.send(&config.mail_from, email).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt + 1 < config.max_attempts => {
                let delay = config.retry_base * 2u32.pow(attempt);
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "email send failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn load_order_context(
    orm: &OrmConn,
    order_id: Uuid,
) -> AppResult<(OrderModel, UserModel, Vec<OrderItemModel>)> {
    let order = Orders::find_by_id(order_id)
        .one(orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let user = Users::find_by_id(order.user_id)
        .one(orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(orm)
        .await?;
    Ok((order, user, items))
}

pub fn compose_confirmation(
    order: &OrderModel,
    user: &UserModel,
    items: &[OrderItemModel],
) -> EmailMessage {
    let mut body = format!(
        "Dear {},\n\n\
         Thank you for your order!\n\n\
         Order Details:\n\
         Order ID: #{}\n\
         Total Amount: {}\n\
         Payment Method: {}\n\
         Status: {}\n\n\
         Shipping Address:\n{}\n\
         Phone: {}\n\n\
         Order Items:\n",
        user.username,
        order.order_number,
        format_amount(order.total_amount),
        order.payment_method,
        order.status,
        order.shipping_address,
        order.phone,
    );

    for item in items {
        body.push_str(&format!(
            "- {} x {} = {}\n",
            item.product_name,
            item.quantity,
            format_amount(item.subtotal)
        ));
    }

    body.push_str(
        "\nYour order is being processed and will be shipped soon.\n\
         You can track your order status in your account.\n\n\
         Thank you for shopping with us!\n",
    );

    EmailMessage {
        to: user.email.clone(),
        subject: format!("Order Confirmation - Order #{}", order.order_number),
        body,
    }
}

pub fn compose_status_update(
    order: &OrderModel,
    user: &UserModel,
    old_status: &str,
    new_status: &str,
) -> EmailMessage {
    let body = format!(
        "Dear {},\n\n\
         Your order status has been updated.\n\n\
         Order ID: #{}\n\
         Previous Status: {}\n\
         Current Status: {}\n\n\
         You can view your order details in your account.\n\n\
         Thank you for shopping with us!\n",
        user.username, order.order_number, old_status, new_status,
    );

    EmailMessage {
        to: user.email.clone(),
        subject: format!("Order Status Update - Order #{}", order.order_number),
        body,
    }
}

fn format_amount(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, (minor_units % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MemoryMailer;

    fn test_config(max_attempts: u32) -> NotifyConfig {
        NotifyConfig {
            mail_from: "orders@storefront.example".into(),
            max_attempts,
            retry_base: Duration::from_millis(1),
        }
    }

    fn sample_order() -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            order_number: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: "pending".into(),
            payment_method: "cod".into(),
            total_amount: 2500,
            shipping_address: "1 Crab Lane".into(),
            phone: "+4915112345678".into(),
            notes: "".into(),
            email_sent: false,
            created_at: chrono::Utc::now().into(),
            updated_at: chrono::Utc::now().into(),
        }
    }

    fn sample_user() -> UserModel {
        UserModel {
            id: Uuid::new_v4(),
            username: "ferris".into(),
            email: "ferris@example.com".into(),
            password_hash: "x".into(),
            role: "customer".into(),
            phone: "".into(),
            address: "".into(),
            is_verified: false,
            created_at: chrono::Utc::now().into(),
            updated_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn confirmation_lists_every_line_item() {
        let order = sample_order();
        let user = sample_user();
        let items = vec![OrderItemModel {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Some(Uuid::new_v4()),
            product_name: "Ferris Mug".into(),
            quantity: 2,
            price: 1250,
            subtotal: 2500,
            created_at: chrono::Utc::now().into(),
        }];

        let email = compose_confirmation(&order, &user, &items);
        assert_eq!(email.to, "ferris@example.com");
        assert!(email.subject.contains(&order.order_number.to_string()));
        assert!(email.body.contains("Ferris Mug x 2 = 25.00"));
        assert!(email.body.contains("Total Amount: 25.00"));
    }

    #[test]
    fn status_update_names_both_statuses() {
        let order = sample_order();
        let user = sample_user();
        let email = compose_status_update(&order, &user, "pending", "shipped");
        assert!(email.body.contains("Previous Status: pending"));
        assert!(email.body.contains("Current Status: shipped"));
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let memory = MemoryMailer::failing(2);
        let mailer = Mailer::Memory(memory.clone());
        let email = EmailMessage {
            to: "a@b.com".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        send_with_retry(&mailer, &test_config(3), &email)
            .await
            .unwrap();
        assert_eq!(memory.sent().len(), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let memory = MemoryMailer::failing(3);
        let mailer = Mailer::Memory(memory.clone());
        let email = EmailMessage {
            to: "a@b.com".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        assert!(
            send_with_retry(&mailer, &test_config(3), &email)
                .await
                .is_err()
        );
        assert!(memory.sent().is_empty());
    }
}
