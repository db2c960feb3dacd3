//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (listeners → routes → backends → servers)
//! - Validate value ranges (ports, URI roots, backend counts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} '{name}' references unknown {target} '{target_name}'")]
    UnknownReference {
        kind: &'static str,
        name: String,
        target: &'static str,
        target_name: String,
    },

    #[error("server '{0}' has port 0")]
    InvalidPort(String),

    #[error("server '{0}' has an empty ping_uri but health checks are enabled")]
    EmptyPingUri(String),

    #[error("server '{name}' ping_uri '{ping_uri}' must start with '/'")]
    InvalidPingUri { name: String, ping_uri: String },

    #[error("route '{name}' uri_root '{uri_root}' must start with '/'")]
    InvalidUriRoot { name: String, uri_root: String },

    #[error("route '{name}' without a multi-backend adapter must list exactly one backend (found {count})")]
    SingleBackendCount { name: String, count: usize },

    #[error("route '{0}' with a multi-backend adapter lists no backends")]
    NoBackends(String),

    #[error("backend '{0}' lists no servers")]
    NoServers(String),
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            errors.push(ValidationError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
}

/// Validate a gateway model.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_unique("server", config.servers.iter().map(|s| s.name.as_str()), &mut errors);
    check_unique("backend", config.backends.iter().map(|b| b.name.as_str()), &mut errors);
    check_unique("route", config.routes.iter().map(|r| r.name.as_str()), &mut errors);
    check_unique("listener", config.listeners.iter().map(|l| l.name.as_str()), &mut errors);

    for server in &config.servers {
        if server.port == 0 {
            errors.push(ValidationError::InvalidPort(server.name.clone()));
        }
        if config.settings.health_check.enabled && server.health_check && server.ping_uri.is_empty() {
            errors.push(ValidationError::EmptyPingUri(server.name.clone()));
        }
        if !server.ping_uri.is_empty() && !server.ping_uri.starts_with('/') {
            errors.push(ValidationError::InvalidPingUri {
                name: server.name.clone(),
                ping_uri: server.ping_uri.clone(),
            });
        }
    }

    for backend in &config.backends {
        if backend.servers.is_empty() {
            errors.push(ValidationError::NoServers(backend.name.clone()));
        }
        for server in &backend.servers {
            if config.server(server).is_none() {
                errors.push(ValidationError::UnknownReference {
                    kind: "backend",
                    name: backend.name.clone(),
                    target: "server",
                    target_name: server.clone(),
                });
            }
        }
    }

    for route in &config.routes {
        if !route.uri_root.starts_with('/') {
            errors.push(ValidationError::InvalidUriRoot {
                name: route.name.clone(),
                uri_root: route.uri_root.clone(),
            });
        }
        match &route.multi_backend_adapter {
            Some(_) if route.backends.is_empty() => {
                errors.push(ValidationError::NoBackends(route.name.clone()));
            }
            None if route.backends.len() != 1 => {
                errors.push(ValidationError::SingleBackendCount {
                    name: route.name.clone(),
                    count: route.backends.len(),
                });
            }
            _ => {}
        }
        check_unique(
            "backend in route",
            route.backends.iter().map(String::as_str),
            &mut errors,
        );
        for backend in &route.backends {
            if config.backend(backend).is_none() {
                errors.push(ValidationError::UnknownReference {
                    kind: "route",
                    name: route.name.clone(),
                    target: "backend",
                    target_name: backend.clone(),
                });
            }
        }
    }

    for listener in &config.listeners {
        for route in &listener.routes {
            if config.route(route).is_none() {
                errors.push(ValidationError::UnknownReference {
                    kind: "listener",
                    name: listener.name.clone(),
                    target: "route",
                    target_name: route.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, ListenerConfig, RouteConfig, ServerConfig};

    fn valid_config() -> GatewayConfig {
        GatewayConfig {
            servers: vec![ServerConfig::new("s1", "127.0.0.1", 9001)],
            backends: vec![BackendConfig {
                name: "b1".into(),
                servers: vec!["s1".into()],
                load_balancer_policy: "round-robin".into(),
            }],
            routes: vec![RouteConfig {
                name: "r1".into(),
                uri_root: "/foo".into(),
                backends: vec!["b1".into()],
                plugins: vec![],
                multi_backend_adapter: None,
                guard: None,
            }],
            listeners: vec![ListenerConfig {
                name: "main".into(),
                address: "127.0.0.1:8080".into(),
                routes: vec!["r1".into()],
                plugins: vec![],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = valid_config();
        config.servers[0].port = 0;
        config.routes[0].uri_root = "foo".into();
        config.routes[0].backends.push("missing".into());
        config.listeners[0].routes.push("nope".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidPort("s1".into())));
        assert!(errors.contains(&ValidationError::InvalidUriRoot {
            name: "r1".into(),
            uri_root: "foo".into()
        }));
        assert!(errors.contains(&ValidationError::SingleBackendCount {
            name: "r1".into(),
            count: 2
        }));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::UnknownReference { target: "route", .. }
        )));
    }

    #[test]
    fn test_adapter_route_accepts_many_backends() {
        let mut config = valid_config();
        config.backends.push(BackendConfig {
            name: "b2".into(),
            servers: vec!["s1".into()],
            load_balancer_policy: "round-robin".into(),
        });
        config.routes[0].backends.push("b2".into());
        config.routes[0].multi_backend_adapter = Some("scatter".into());

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_names() {
        let mut config = valid_config();
        config.servers.push(ServerConfig::new("s1", "127.0.0.2", 9002));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Duplicate {
                kind: "server",
                name: "s1".into()
            }]
        );
    }

    #[test]
    fn test_empty_ping_uri_only_matters_when_probing() {
        let mut config = valid_config();
        config.servers[0].ping_uri.clear();
        assert!(validate_config(&config).is_ok());

        config.settings.health_check.enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::EmptyPingUri("s1".into())]
        );
    }

    #[test]
    fn test_ping_uri_must_be_a_path() {
        let mut config = valid_config();
        config.servers[0].ping_uri = "health".into();

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidPingUri {
                name: "s1".into(),
                ping_uri: "health".into()
            }]
        );
    }

    #[test]
    fn test_route_lists_backend_twice() {
        let mut config = valid_config();
        config.routes[0].backends.push("b1".into());
        config.routes[0].multi_backend_adapter = Some("scatter".into());

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::Duplicate {
                kind: "backend in route",
                name: "b1".into()
            }]
        );
    }
}
