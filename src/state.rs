use std::sync::Arc;

use crate::{db::OrmConn, payment::PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub gateway: Arc<dyn PaymentGateway>,
}
