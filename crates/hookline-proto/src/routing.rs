//! Routing document consumed by the external proxy.
//!
//! The shape matches a Traefik HTTP-provider dynamic configuration:
//! routers keyed by name referencing services, services carrying a
//! single-upstream load balancer. An empty document must serialise to
//! `{}` (not nested empty maps) so the proxy treats it as "no rules".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of the routing document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDocument {
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub routers: BTreeMap<String, RouterConfig>,
    pub services: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub rule: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "loadBalancer")]
    pub load_balancer: LoadBalancerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
}

impl RoutingDocument {
    /// Whether the document carries no routers and no services.
    pub fn is_empty(&self) -> bool {
        self.http.routers.is_empty() && self.http.services.is_empty()
    }

    /// Serialises the document, collapsing the empty case to `{}`.
    pub fn to_json_value(&self) -> serde_json::Value {
        if self.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::to_value(self).unwrap_or_else(|_| {
                // A plain-data struct cannot fail to serialise.
                serde_json::Value::Object(serde_json::Map::new())
            })
        }
    }

    /// Adds a service with a single upstream.
    pub fn add_service(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.http.services.insert(
            name.into(),
            ServiceConfig {
                load_balancer: LoadBalancerConfig {
                    servers: vec![ServerConfig { url: url.into() }],
                },
            },
        );
    }

    /// Adds a path-prefix router targeting an existing service.
    pub fn add_router(
        &mut self,
        name: impl Into<String>,
        prefix: impl AsRef<str>,
        service: impl Into<String>,
    ) {
        self.http.routers.insert(
            name.into(),
            RouterConfig {
                rule: format!("PathPrefix(`{}`)", prefix.as_ref()),
                service: service.into(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_collapses_to_empty_object() {
        let doc = RoutingDocument::default();
        assert_eq!(doc.to_json_value(), serde_json::json!({}));
    }

    #[test]
    fn document_shape_matches_provider_format() {
        let mut doc = RoutingDocument::default();
        doc.add_service("service-c1", "http://10.0.0.1:8080");
        doc.add_router("webhook-c1", "/webhook/c1", "service-c1");

        let value = doc.to_json_value();
        assert_eq!(
            value["http"]["routers"]["webhook-c1"]["rule"],
            "PathPrefix(`/webhook/c1`)"
        );
        assert_eq!(
            value["http"]["routers"]["webhook-c1"]["service"],
            "service-c1"
        );
        assert_eq!(
            value["http"]["services"]["service-c1"]["loadBalancer"]["servers"][0]["url"],
            "http://10.0.0.1:8080"
        );
    }
}
