use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DescriptorError;

mod origin_access;
pub use origin_access::*;
mod s3_bucket;
pub use s3_bucket::*;
mod bucket_policy;
pub use bucket_policy::*;
mod certificate;
pub use certificate::*;
mod cloudfront;
pub use cloudfront::*;
mod route53;
pub use route53::*;

// higher level resources:
mod static_website;
pub use static_website::*;

/// anything that can be rendered as a single cloudformation resource.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    /// checked before the resource is added to a template.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub struct Resource {
    pub name: String,
    /// explicit ordering edges. cloudformation infers edges from
    /// Ref/GetAtt as well, but we never rely on that for ordering.
    pub depends_on: Vec<String>,
    pub properties: Box<dyn CfnResource>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "Properties")]
    pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: "2010-09-09".to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    /// the order a deployment engine must create resources in so that
    /// every `DependsOn` target exists first. Ties are broken by logical id
    /// so the order is stable between runs.
    pub fn deployment_order(&self) -> Result<Vec<String>, String> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (name, resource) in self.resources.iter() {
            let mut deps = BTreeSet::new();
            for dep in resource.depends_on.iter() {
                if !self.resources.contains_key(dep) {
                    return Err(format!("Resource '{name}' depends on '{dep}' which does not exist in the template"));
                }
                deps.insert(dep.as_str());
            }
            remaining.insert(name.as_str(), deps);
        }
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining.iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                let stuck: Vec<&str> = remaining.keys().copied().collect();
                return Err(format!("Dependency cycle between resources {:?}", stuck));
            }
            for name in ready {
                remaining.remove(name);
                for deps in remaining.values_mut() {
                    deps.remove(name);
                }
                order.push(name.to_string());
            }
        }
        Ok(order)
    }
}

/// collects everything a stack needs before it can become a template.
#[derive(Default)]
pub struct StackInput {
    pub description: Option<String>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<(String, ResourceOutput)>,
}

impl StackInput {
    pub fn push<R: CfnResource + 'static>(&mut self, name: &str, properties: R, depends_on: &[&str]) {
        self.resources.push(Resource {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            properties: Box::new(properties) as _,
        });
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) {
        self.outputs.push((name.to_string(), ResourceOutput {
            description: description.to_string(),
            value,
        }));
    }

    pub fn to_template(&self) -> Result<SavedTemplate, DescriptorError> {
        let mut out_template = validate_resources_to_template(&self.resources)?;
        out_template.description = self.description.clone();
        for (name, output) in self.outputs.iter() {
            if let Some(message) = verify_resource_name(name) {
                return Err(DescriptorError::InvalidResource { name: name.clone(), message });
            }
            check_references(name, &output.value, &out_template)?;
            out_template.outputs.insert(name.clone(), output.clone());
        }
        out_template.deployment_order().map_err(DescriptorError::DependencyGraph)?;
        Ok(out_template)
    }
}

fn validate_resources_to_template(resources: &[Resource]) -> Result<SavedTemplate, DescriptorError> {
    let mut out_template = SavedTemplate::default();
    for resource in resources.iter() {
        if let Some(message) = verify_resource_name(&resource.name) {
            return Err(DescriptorError::InvalidResource { name: resource.name.clone(), message });
        }
        if let Err(message) = resource.properties.validate() {
            return Err(DescriptorError::InvalidResource { name: resource.name.clone(), message });
        }
        let saved_resource = SavedResource {
            ty: resource.properties.type_string().to_string(),
            depends_on: resource.depends_on.clone(),
            properties: resource.properties.properties(),
        };
        if out_template.resources.insert(resource.name.clone(), saved_resource).is_some() {
            return Err(DescriptorError::InvalidResource {
                name: resource.name.clone(),
                message: "Duplicate logical id".to_string(),
            });
        }
    }
    for (name, resource) in out_template.resources.iter() {
        check_references(name, &resource.properties, &out_template)?;
    }
    Ok(out_template)
}

fn check_references(owner: &str, value: &Value, template: &SavedTemplate) -> Result<(), DescriptorError> {
    let mut refs = BTreeSet::new();
    collect_references(value, &mut refs);
    for logical_id in refs {
        if !template.resources.contains_key(&logical_id) {
            return Err(DescriptorError::InvalidResource {
                name: owner.to_string(),
                message: format!("References unknown resource '{logical_id}'"),
            });
        }
    }
    Ok(())
}

/// finds the logical ids used by Ref, Fn::GetAtt and Fn::Sub inside a value.
/// pseudo parameters (AWS::Region etc.) are skipped.
pub fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter() {
                match (key.as_str(), val) {
                    ("Ref", Value::String(s)) => {
                        if !s.starts_with("AWS::") {
                            out.insert(s.clone());
                        }
                    }
                    ("Fn::GetAtt", Value::Array(parts)) => {
                        if let Some(Value::String(s)) = parts.first() {
                            out.insert(s.clone());
                        }
                    }
                    ("Fn::Sub", Value::String(s)) => {
                        for name in sub_variables(s) {
                            if !name.starts_with("AWS::") {
                                out.insert(name);
                            }
                        }
                    }
                    _ => collect_references(val, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn sub_variables(s: &str) -> Vec<String> {
    let mut out = vec![];
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(e) => e,
            None => break,
        };
        let var = &after[..end];
        // ${!Literal} is an escape, not a variable
        if !var.starts_with('!') {
            let logical = var.split('.').next().unwrap_or(var);
            out.push(logical.to_string());
        }
        rest = &after[end + 1..];
    }
    out
}

pub fn get_ref(logical_id: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("Ref".to_string(), Value::String(logical_id.to_string()));
    Value::Object(map)
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("Fn::GetAtt".to_string(), Value::Array(vec![
        Value::String(logical_id.to_string()),
        Value::String(attribute.to_string()),
    ]));
    Value::Object(map)
}

pub fn sub(s: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("Fn::Sub".to_string(), Value::String(s.to_string()));
    Value::Object(map)
}

pub fn verify_resource_name(resource_name: &str) -> Option<String> {
    if resource_name.len() > 255 {
        return Some(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.is_empty() {
        return Some(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    None
}
