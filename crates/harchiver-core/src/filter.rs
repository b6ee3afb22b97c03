//! Caller-supplied predicates deciding whether an exchange is archived.
//!
//! Filters run on the notifying thread before any entry construction, so an
//! exchange they reject costs nothing beyond the predicate call itself.

use std::sync::Arc;

use crate::exchange::{Exchange, ResponseContext};

/// Inspects the exchange only.
pub type OperationFilter = Arc<dyn Fn(&Exchange) -> bool + Send + Sync>;

/// Also receives the negotiated response format and decoded value, e.g. to
/// skip images.
pub type TaskFilter = Arc<dyn Fn(&Exchange, Option<&ResponseContext>) -> bool + Send + Sync>;

/// The filters currently installed. Every installed filter must accept.
#[derive(Clone, Default)]
pub struct FilterSet {
    pub operation: Option<OperationFilter>,
    pub task: Option<TaskFilter>,
}

impl FilterSet {
    pub fn accepts(&self, exchange: &Exchange) -> bool {
        if let Some(f) = &self.operation {
            if !f(exchange) {
                return false;
            }
        }
        if let Some(f) = &self.task {
            if !f(exchange, exchange.context.as_ref()) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.operation.is_none() && self.task.is_none()
    }
}

/// Task filter that drops exchanges whose response decoded as an image.
pub fn skip_images() -> TaskFilter {
    Arc::new(|_: &Exchange, ctx: Option<&ResponseContext>| {
        !matches!(ctx, Some(c) if c.format == crate::exchange::ResponseFormat::Image)
    })
}
