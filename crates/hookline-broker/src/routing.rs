//! Routing document publisher.
//!
//! Per channel: one service whose load balancer lists exactly the owning
//! broker, a `ws-` router for every owned channel (so agents can attach
//! to MINTED channels) and a `webhook-` router only once the channel is
//! ATTACHED (no webhooks until the tunnel is up).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use hookline_proto::RoutingDocument;

use crate::broker::Broker;
use crate::cluster::{self, ClusterView};

/// Builds the document for the whole fleet view.
pub fn build_document(view: &ClusterView) -> RoutingDocument {
    let mut doc = RoutingDocument::default();
    for inventory in view.inventories.values() {
        for id in &inventory.ws_channels {
            doc.add_service(format!("service-{id}"), &inventory.server_url);
            doc.add_router(format!("ws-{id}"), format!("/ws/{id}"), format!("service-{id}"));
        }
        for id in &inventory.webhook_channels {
            if !inventory.ws_channels.contains(id) {
                doc.add_service(format!("service-{id}"), &inventory.server_url);
            }
            doc.add_router(
                format!("webhook-{id}"),
                format!("/webhook/{id}"),
                format!("service-{id}"),
            );
        }
    }
    doc
}

/// `GET /traefik-config`: aggregates the fleet and emits the document,
/// or `{}` when there are no channels anywhere.
pub async fn traefik_config_handler(State(broker): State<Arc<Broker>>) -> Json<serde_json::Value> {
    let view = cluster::aggregate(&broker).await;
    Json(build_document(&view).to_json_value())
}
