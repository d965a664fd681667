use rand::Rng;
use std::time::Instant;

use super::ResolveError;

/// How the collector address was configured: a literal `host:port`, or a
/// symbolic name answered by DNS SRV discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSpec {
    Literal { host: String, port: u16 },
    Srv { name: String },
}

impl ServerSpec {
    /// Parses an endpoint specification string.
    ///
    /// `host:port` (including `[v6addr]:port`) selects a literal target; a
    /// bare name selects SRV discovery.
    pub fn parse(spec: &str) -> Result<Self, ResolveError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ResolveError::InvalidSpec("empty server spec".to_string()));
        }

        // Bracketed IPv6 literal: [addr]:port
        if let Some(rest) = spec.strip_prefix('[') {
            let Some((host, port)) = rest.split_once("]:") else {
                return Err(ResolveError::InvalidSpec(format!(
                    "malformed IPv6 spec '{spec}', expected [addr]:port"
                )));
            };
            if host.is_empty() {
                return Err(ResolveError::InvalidSpec(format!("empty host in '{spec}'")));
            }
            return Ok(ServerSpec::Literal {
                host: host.to_string(),
                port: parse_port(port, spec)?,
            });
        }

        match spec.split_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(ResolveError::InvalidSpec(format!("empty host in '{spec}'")));
                }
                if port.contains(':') {
                    return Err(ResolveError::InvalidSpec(format!(
                        "unbracketed IPv6 address in '{spec}', use [addr]:port"
                    )));
                }
                Ok(ServerSpec::Literal {
                    host: host.to_string(),
                    port: parse_port(port, spec)?,
                })
            }
            None => Ok(ServerSpec::Srv {
                name: spec.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerSpec::Literal { host, port } => write!(f, "{host}:{port}"),
            ServerSpec::Srv { name } => write!(f, "srv:{name}"),
        }
    }
}

fn parse_port(port: &str, spec: &str) -> Result<u16, ResolveError> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ResolveError::InvalidSpec(format!(
            "invalid port in '{spec}', expected 1-65535"
        ))),
    }
}

/// A resolved delivery candidate. Snapshots of these are replaced wholesale,
/// never mutated, so readers cannot observe a torn set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub resolved_at: Instant,
}

impl Endpoint {
    pub fn literal(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            priority: 0,
            weight: 0,
            resolved_at: Instant::now(),
        }
    }

    /// Connect target in `host:port` form.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Orders SRV targets per RFC 2782: ascending priority, weighted random
/// selection within each priority band. Zero-weight targets keep a small
/// chance of early selection.
pub fn order_srv_targets<R: Rng>(mut targets: Vec<Endpoint>, rng: &mut R) -> Vec<Endpoint> {
    targets.sort_by_key(|t| t.priority);

    let mut ordered = Vec::with_capacity(targets.len());
    let mut band: Vec<Endpoint> = Vec::new();

    let drain_band = |band: &mut Vec<Endpoint>, ordered: &mut Vec<Endpoint>, rng: &mut R| {
        while !band.is_empty() {
            // Weight + 1 keeps zero-weight targets selectable.
            let total: u64 = band.iter().map(|t| t.weight as u64 + 1).sum();
            let mut pick = rng.random_range(0..total);
            let mut chosen = band.len() - 1;
            for (i, target) in band.iter().enumerate() {
                let w = target.weight as u64 + 1;
                if pick < w {
                    chosen = i;
                    break;
                }
                pick -= w;
            }
            ordered.push(band.remove(chosen));
        }
    };

    for target in targets {
        let band_priority = band.first().map(|t| t.priority);
        if band_priority.is_some_and(|p| p != target.priority) {
            drain_band(&mut band, &mut ordered, rng);
        }
        band.push(target);
    }
    drain_band(&mut band, &mut ordered, rng);

    ordered
}
