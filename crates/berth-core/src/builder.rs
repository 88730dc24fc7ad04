//! Assembles resolutions into an [`OverrideDocument`] and validates it.
//!
//! Validation runs before the document is returned. Any inconsistency is a
//! hard [`BerthError::Validation`]; no partial document is produced.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::document::{
    Ipam, IpamConfig, NetworkOverride, OverrideDocument, ServiceNetworkOverride,
};
use crate::error::{BerthError, Result};
use crate::types::{Manifest, NetworkResolution, PortResolution};

/// Builds the minimal override for one manifest.
#[derive(Debug, Clone)]
pub struct OverrideBuilder<'a> {
    manifest: &'a Manifest,
    generated_at: DateTime<Utc>,
}

impl<'a> OverrideBuilder<'a> {
    /// Create a builder for `manifest`.
    #[must_use]
    pub fn new(manifest: &'a Manifest, generated_at: DateTime<Utc>) -> Self {
        Self {
            manifest,
            generated_at,
        }
    }

    /// Build and validate the override.
    ///
    /// Only services with a changed port or static address, and only
    /// networks with a replacement subnet, are included.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Validation`] if a resolution refers to an unknown
    /// service, binding or network, or if the result fails
    /// [`validate_document`].
    pub fn build(
        &self,
        port_resolutions: &[PortResolution],
        network_resolutions: &[NetworkResolution],
    ) -> Result<OverrideDocument> {
        let mut doc = OverrideDocument::empty(&self.manifest.project_name, self.generated_at);

        for resolution in port_resolutions {
            let service = self.manifest.service(&resolution.service).ok_or_else(|| {
                BerthError::validation(format!(
                    "service {} not found in manifest",
                    resolution.service
                ))
            })?;
            let binding = service.bindings.get(resolution.binding_index).ok_or_else(|| {
                BerthError::validation(format!(
                    "service {} has no port binding #{}",
                    service.name, resolution.binding_index
                ))
            })?;
            if binding.host_port != resolution.original_port {
                return Err(BerthError::validation(format!(
                    "service {} binding #{} publishes {}, not {}",
                    service.name, resolution.binding_index, binding.host_port, resolution.original_port
                )));
            }

            let entry = doc.services.entry(service.name.clone()).or_default();
            if entry.ports.is_empty() {
                entry.ports.clone_from(&service.bindings);
            }
            entry.ports[resolution.binding_index] = binding.with_host_port(resolution.resolved_port);
            debug!(
                service = %service.name,
                from = resolution.original_port,
                to = resolution.resolved_port,
                "port override added"
            );
        }

        for resolution in network_resolutions {
            if self.manifest.network(&resolution.network_name).is_none() {
                return Err(BerthError::validation(format!(
                    "network {} not found in manifest",
                    resolution.network_name
                )));
            }
            doc.networks.insert(
                resolution.network_name.clone(),
                NetworkOverride {
                    ipam: Ipam {
                        config: vec![IpamConfig {
                            subnet: resolution.resolved_subnet,
                        }],
                    },
                },
            );

            for (service_name, ip) in &resolution.ip_address_mapping {
                let attached = self
                    .manifest
                    .service(service_name)
                    .is_some_and(|s| s.networks.contains_key(&resolution.network_name));
                if !attached {
                    return Err(BerthError::validation(format!(
                        "service {service_name} is not attached to network {}",
                        resolution.network_name
                    )));
                }
                doc.services
                    .entry(service_name.clone())
                    .or_default()
                    .networks
                    .insert(
                        resolution.network_name.clone(),
                        ServiceNetworkOverride { ipv4_address: *ip },
                    );
            }
        }

        doc.metadata.resolutions = port_resolutions.to_vec();
        doc.metadata.network_resolutions = network_resolutions.to_vec();

        validate_document(&doc)?;
        info!(
            services = doc.services.len(),
            networks = doc.networks.len(),
            "override document built"
        );
        Ok(doc)
    }
}

/// Check an override document for internal consistency.
///
/// - no resolved host port is used by two resolutions, nor by any other
///   binding in the override
/// - every container port is non-zero and no resolved port is zero
/// - `metadata.resolutions` matches the ports actually present
///
/// # Errors
///
/// Returns [`BerthError::Validation`] describing the first inconsistency.
pub fn validate_document(doc: &OverrideDocument) -> Result<()> {
    let mut resolved: HashMap<u16, (&str, usize)> = HashMap::new();
    for r in &doc.metadata.resolutions {
        if r.resolved_port == 0 {
            return Err(BerthError::validation(format!(
                "service {} resolved to port 0",
                r.service
            )));
        }
        if let Some((other, _)) = resolved.insert(r.resolved_port, (r.service.as_str(), r.binding_index)) {
            return Err(BerthError::validation(format!(
                "resolved port {} is assigned to both {other} and {}",
                r.resolved_port, r.service
            )));
        }

        let present = doc
            .services
            .get(&r.service)
            .and_then(|s| s.ports.get(r.binding_index))
            .is_some_and(|b| b.host_port == r.resolved_port);
        if !present {
            return Err(BerthError::validation(format!(
                "resolution {}:{} -> {} is not reflected in the service overrides",
                r.service, r.original_port, r.resolved_port
            )));
        }
    }

    let mut changed: BTreeMap<&str, usize> = BTreeMap::new();
    for (name, service) in &doc.services {
        for (index, binding) in service.ports.iter().enumerate() {
            if binding.container_port == 0 {
                return Err(BerthError::validation(format!(
                    "service {name} has container port 0"
                )));
            }
            if let Some((owner, owner_index)) = resolved.get(&binding.host_port) {
                if *owner != name.as_str() || *owner_index != index {
                    return Err(BerthError::validation(format!(
                        "resolved port {} for {owner} collides with a binding of {name}",
                        binding.host_port
                    )));
                }
                *changed.entry(name.as_str()).or_default() += 1;
            }
        }
    }

    let applied: usize = changed.values().sum();
    if applied != doc.metadata.resolutions.len() {
        return Err(BerthError::validation(format!(
            "metadata lists {} resolutions but {applied} are applied",
            doc.metadata.resolutions.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::types::{NetworkSpec, PortBinding, ResolutionStrategy, Service};

    fn manifest() -> Manifest {
        Manifest::new("shop")
            .with_service(Service::new("web").with_binding(PortBinding::new(3000, 3000)))
            .with_service(
                Service::new("api")
                    .with_binding(PortBinding::new(3000, 3000))
                    .with_binding(PortBinding::new(0, 9229))
                    .with_network("app-network", None),
            )
            .with_service(Service::new("db").with_network("app-network", Some("172.20.0.5")))
            .with_network(NetworkSpec::new("app-network").with_subnet("172.20.0.0/24"))
    }

    fn port_resolution(service: &str, index: usize, from: u16, to: u16) -> PortResolution {
        PortResolution {
            service: service.into(),
            binding_index: index,
            original_port: from,
            resolved_port: to,
            strategy: ResolutionStrategy::AutoIncrement,
            reason: "test".into(),
            timestamp: Utc::now(),
        }
    }

    fn network_resolution() -> NetworkResolution {
        NetworkResolution {
            network_name: "app-network".into(),
            original_subnet: "172.20.0.0/24".parse().expect("cidr"),
            resolved_subnet: "10.20.0.0/24".parse().expect("cidr"),
            ip_address_mapping: BTreeMap::from([("db".to_string(), Ipv4Addr::new(10, 20, 0, 5))]),
            reason: "test".into(),
        }
    }

    #[test]
    fn test_minimal_document() {
        let manifest = manifest();
        let doc = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("api", 0, 3000, 3001)], &[network_resolution()])
            .expect("build");

        assert_eq!(doc.services.len(), 2);
        assert!(!doc.services.contains_key("web"));
        let api = &doc.services["api"];
        assert_eq!(api.ports, vec![PortBinding::new(3001, 3000), PortBinding::new(0, 9229)]);
        assert!(api.networks.is_empty());

        let db = &doc.services["db"];
        assert!(db.ports.is_empty());
        assert_eq!(db.networks["app-network"].ipv4_address, Ipv4Addr::new(10, 20, 0, 5));
        assert_eq!(doc.networks["app-network"].ipam.config[0].subnet.to_string(), "10.20.0.0/24");
        assert_eq!(doc.metadata.resolutions.len(), 1);
        assert_eq!(doc.metadata.network_resolutions.len(), 1);
    }

    #[test]
    fn test_empty_inputs_empty_document() {
        let manifest = manifest();
        let doc = OverrideBuilder::new(&manifest, Utc::now()).build(&[], &[]).expect("build");
        assert!(doc.is_empty());
    }

    #[test]
    fn test_unknown_service_rejected() {
        let manifest = manifest();
        let err = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("ghost", 0, 3000, 3001)], &[])
            .expect_err("unknown");
        assert!(matches!(err, BerthError::Validation { .. }));
    }

    #[test]
    fn test_mismatched_original_port_rejected() {
        let manifest = manifest();
        let err = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("api", 0, 4000, 3001)], &[])
            .expect_err("mismatch");
        assert!(err.to_string().contains("not 4000"));
    }

    #[test]
    fn test_duplicate_resolved_port_rejected() {
        let manifest = manifest();
        let err = OverrideBuilder::new(&manifest, Utc::now())
            .build(
                &[
                    port_resolution("web", 0, 3000, 8000),
                    port_resolution("api", 0, 3000, 8000),
                ],
                &[],
            )
            .expect_err("duplicate");
        assert!(err.to_string().contains("assigned to both web and api"));
    }

    #[test]
    fn test_unattached_remap_rejected() {
        let manifest = manifest();
        let mut resolution = network_resolution();
        resolution
            .ip_address_mapping
            .insert("web".into(), Ipv4Addr::new(10, 20, 0, 9));
        let err = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[], &[resolution])
            .expect_err("unattached");
        assert!(err.to_string().contains("not attached"));
    }

    #[test]
    fn test_validate_detects_metadata_drift() {
        let manifest = manifest();
        let mut doc = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("api", 0, 3000, 3001)], &[])
            .expect("build");
        doc.metadata.resolutions.clear();
        assert!(validate_document(&doc).is_err());

        let mut doc = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("api", 0, 3000, 3001)], &[])
            .expect("build");
        doc.services.get_mut("api").expect("api").ports[0].host_port = 3002;
        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn test_validate_detects_collision_with_other_binding() {
        let manifest = manifest();
        let mut doc = OverrideBuilder::new(&manifest, Utc::now())
            .build(&[port_resolution("api", 0, 3000, 3001)], &[])
            .expect("build");
        doc.services.insert(
            "web".into(),
            crate::document::ServiceOverride {
                ports: vec![PortBinding::new(3001, 3000)],
                networks: BTreeMap::new(),
            },
        );
        let err = validate_document(&doc).expect_err("collision");
        assert!(err.to_string().contains("collides"));
    }
}
