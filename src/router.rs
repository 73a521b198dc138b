//! Request routing.
//!
//! Paths have the shape `/{tenant}[/{version}]/{endpoint}[/{id}]`. Resource endpoints
//! are matched against the configured aliases case-insensitively; a version segment
//! (`v1`, `v2`, `scim2.0`, …) overrides the configured protocol version for the request.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::model::ResourceKind;
use crate::version::ScimVersion;
use std::fmt;
use std::str::FromStr;

/// Tenant used when a path starts directly with an endpoint.
pub const DEFAULT_TENANT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = GatewayError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(GatewayError::MethodNotAllowed {
                method: other.to_string(),
                path: String::new(),
            }),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation on a User or Group collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOperation {
    List,
    Get(String),
    Create,
    Modify(String),
    Replace(String),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Resource {
        kind: ResourceKind,
        operation: ResourceOperation,
    },
    IssueToken,
    ServiceProviderConfig,
    ResourceTypes,
}

/// A routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub tenant: String,
    /// Version named in the path, if any
    pub version: Option<ScimVersion>,
    pub endpoint: Endpoint,
    /// Path of the collection as addressed, e.g. `t1/v2/Users`
    pub collection_path: String,
}

impl RouteMatch {
    /// URL of the addressed collection under `base_url`.
    pub fn location_base(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.collection_path)
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    user_aliases: Vec<String>,
    group_aliases: Vec<String>,
}

fn matches_any(aliases: &[String], segment: &str) -> bool {
    aliases.iter().any(|a| a.eq_ignore_ascii_case(segment))
}

fn decode_id(raw: &str) -> GatewayResult<String> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| GatewayError::invalid_request(format!("invalid id encoding '{}'", raw)))?;
    if decoded.is_empty() {
        return Err(GatewayError::invalid_request("empty resource id"));
    }
    Ok(decoded.into_owned())
}

impl Router {
    pub fn new(user_aliases: Vec<String>, group_aliases: Vec<String>) -> Self {
        Self {
            user_aliases,
            group_aliases,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.user_endpoints.clone(), config.group_endpoints.clone())
    }

    fn resource_kind(&self, segment: &str) -> Option<ResourceKind> {
        if matches_any(&self.user_aliases, segment) {
            Some(ResourceKind::User)
        } else if matches_any(&self.group_aliases, segment) {
            Some(ResourceKind::Group)
        } else {
            None
        }
    }

    fn is_endpoint(&self, segment: &str) -> bool {
        self.resource_kind(segment).is_some()
            || ScimVersion::from_path_segment(segment).is_some()
            || ["oauth", "serviceproviderconfig", "serviceproviderconfigs", "resourcetypes"]
                .iter()
                .any(|e| e.eq_ignore_ascii_case(segment))
    }

    /// Map a method and path to an endpoint.
    pub fn route(&self, method: HttpMethod, path: &str) -> GatewayResult<RouteMatch> {
        let path_only = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();
        let not_found = || GatewayError::NotFound {
            message: format!("No endpoint at '{}'", path_only),
        };
        let not_allowed = || GatewayError::MethodNotAllowed {
            method: method.to_string(),
            path: path_only.to_string(),
        };

        let (tenant, rest) = match segments.split_first() {
            Some((first, _)) if self.is_endpoint(first) => (DEFAULT_TENANT.to_string(), &segments[..]),
            Some((first, rest)) => (decode_id(first)?, rest),
            None => return Err(not_found()),
        };

        let (version, rest) = match rest.split_first() {
            Some((segment, tail)) => match ScimVersion::from_path_segment(segment) {
                Some(version) => (Some(version), tail),
                None => (None, rest),
            },
            None => (None, rest),
        };

        let consumed = segments.len() - rest.len();
        let Some((endpoint_segment, tail)) = rest.split_first() else {
            return Err(not_found());
        };
        let collection_path = segments[..=consumed].join("/");

        let endpoint = if let Some(kind) = self.resource_kind(endpoint_segment) {
            let operation = match (method, tail) {
                (HttpMethod::Get, []) => ResourceOperation::List,
                (HttpMethod::Post, []) => ResourceOperation::Create,
                (HttpMethod::Get, [id]) => ResourceOperation::Get(decode_id(id)?),
                (HttpMethod::Patch, [id]) => ResourceOperation::Modify(decode_id(id)?),
                (HttpMethod::Put, [id]) => ResourceOperation::Replace(decode_id(id)?),
                (HttpMethod::Delete, [id]) => ResourceOperation::Delete(decode_id(id)?),
                (_, []) | (_, [_]) => return Err(not_allowed()),
                _ => return Err(not_found()),
            };
            Endpoint::Resource { kind, operation }
        } else if endpoint_segment.eq_ignore_ascii_case("oauth") {
            match (method, tail) {
                (HttpMethod::Post, [token]) if token.eq_ignore_ascii_case("token") => {
                    Endpoint::IssueToken
                }
                (_, [token]) if token.eq_ignore_ascii_case("token") => return Err(not_allowed()),
                _ => return Err(not_found()),
            }
        } else if endpoint_segment.eq_ignore_ascii_case("ServiceProviderConfig")
            || endpoint_segment.eq_ignore_ascii_case("ServiceProviderConfigs")
        {
            match (method, tail) {
                (HttpMethod::Get, []) => Endpoint::ServiceProviderConfig,
                (_, []) => return Err(not_allowed()),
                _ => return Err(not_found()),
            }
        } else if endpoint_segment.eq_ignore_ascii_case("ResourceTypes") {
            match (method, tail) {
                (HttpMethod::Get, []) => Endpoint::ResourceTypes,
                (_, []) => return Err(not_allowed()),
                _ => return Err(not_found()),
            }
        } else {
            return Err(not_found());
        };

        Ok(RouteMatch {
            tenant,
            version,
            endpoint,
            collection_path,
        })
    }
}

/// Normalized list/get query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryParams {
    pub filter: Option<String>,
    pub attributes: Vec<String>,
    pub excluded_attributes: Vec<String>,
    pub start_index: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_number(name: &str, value: &str) -> GatewayResult<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        GatewayError::invalid_request(format!("{} must be a non-negative integer", name))
    })
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`). Names are case-insensitive.
    pub fn parse(query: &str) -> GatewayResult<Self> {
        let mut params = QueryParams::default();
        let query = query.trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.to_ascii_lowercase().as_str() {
                "filter" => params.filter = Some(value.into_owned()).filter(|f| !f.trim().is_empty()),
                "attributes" => params.attributes = split_list(&value),
                "excludedattributes" => params.excluded_attributes = split_list(&value),
                "startindex" => params.start_index = Some(parse_number("startIndex", &value)?),
                "count" => params.count = Some(parse_number("count", &value)?),
                "sortby" => params.sort_by = Some(value.into_owned()),
                "sortorder" => params.sort_order = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }

    /// True when the caller asked for `attribute` explicitly.
    pub fn requests(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute) || a.to_ascii_lowercase().starts_with(&format!("{}.", attribute.to_ascii_lowercase())))
    }

    pub fn excludes(&self, attribute: &str) -> bool {
        self.excluded_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }
}
