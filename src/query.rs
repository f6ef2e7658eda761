//! GraphQL document construction
//!
//! An `Operation` is a set of root fields with typed arguments and, for
//! object-valued roots, a selection derived from a `TypeDef` filtered through a
//! `FieldRequest`. Rendering is deterministic: fields appear in schema order and
//! variables in first-use order.

use crate::fields::FieldRequest;
use crate::schema::{FieldType, TypeDef};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// A root field argument bound to a GraphQL variable of the same name.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub graphql_type: String,
    pub value: Value,
}

/// Fields selected on an object-valued root.
#[derive(Debug, Clone)]
pub struct Selection {
    pub ty: &'static TypeDef,
    pub fields: FieldRequest,
}

#[derive(Debug, Clone)]
pub struct RootField {
    pub alias: Option<String>,
    pub name: String,
    pub args: Vec<Argument>,
    pub selection: Option<Selection>,
}

impl RootField {
    pub fn new(name: &str) -> Self {
        Self {
            alias: None,
            name: name.to_string(),
            args: Vec::new(),
            selection: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn arg(mut self, name: &str, graphql_type: &str, value: Value) -> Self {
        self.args.push(Argument {
            name: name.to_string(),
            graphql_type: graphql_type.to_string(),
            value,
        });
        self
    }

    pub fn select(mut self, ty: &'static TypeDef, fields: FieldRequest) -> Self {
        self.selection = Some(Selection { ty, fields });
        self
    }

    /// Key under which the result appears in the response `data` object.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub roots: Vec<RootField>,
}

impl Operation {
    pub fn query(root: RootField) -> Self {
        Self {
            kind: OperationKind::Query,
            roots: vec![root],
        }
    }

    pub fn mutation(root: RootField) -> Self {
        Self {
            kind: OperationKind::Mutation,
            roots: vec![root],
        }
    }

    pub fn with_root(mut self, root: RootField) -> Self {
        self.roots.push(root);
        self
    }

    /// Variables object sent alongside the document.
    pub fn variables(&self) -> Value {
        let mut vars = Map::new();
        for arg in self.roots.iter().flat_map(|r| r.args.iter()) {
            vars.entry(arg.name.clone())
                .or_insert_with(|| arg.value.clone());
        }
        Value::Object(vars)
    }

    /// Renders the GraphQL document text.
    pub fn render(&self) -> String {
        let keyword = match self.kind {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        };

        let mut declared: Vec<(&str, &str)> = Vec::new();
        for arg in self.roots.iter().flat_map(|r| r.args.iter()) {
            if !declared.iter().any(|(name, _)| *name == arg.name) {
                declared.push((arg.name.as_str(), arg.graphql_type.as_str()));
            }
        }

        let mut doc = String::from(keyword);
        if !declared.is_empty() {
            let vars: Vec<String> = declared
                .iter()
                .map(|(name, ty)| format!("${}: {}", name, ty))
                .collect();
            doc.push_str(&format!("({})", vars.join(", ")));
        }
        doc.push_str(" {");

        for root in &self.roots {
            doc.push(' ');
            if let Some(alias) = &root.alias {
                doc.push_str(alias);
                doc.push_str(": ");
            }
            doc.push_str(&root.name);
            if !root.args.is_empty() {
                let args: Vec<String> = root
                    .args
                    .iter()
                    .map(|a| format!("{}: ${}", a.name, a.name))
                    .collect();
                doc.push_str(&format!("({})", args.join(", ")));
            }
            if let Some(selection) = &root.selection {
                let body = render_selection(selection.ty, &selection.fields);
                doc.push_str(&format!(" {{ {} }}", body));
            }
        }
        doc.push_str(" }");
        doc
    }
}

/// Renders the selection body for `ty`, always selecting `id` when declared.
pub fn render_selection(ty: &TypeDef, fields: &FieldRequest) -> String {
    let max_depth = fields.depth();
    let mut parts = Vec::new();
    if ty.field("id").is_some() && !fields.should_include_path("id") {
        parts.push("id".to_string());
    }
    parts.extend(select_fields(ty, fields, "", 0, max_depth));
    parts.join(" ")
}

fn select_fields(
    ty: &TypeDef,
    fields: &FieldRequest,
    prefix: &str,
    level: usize,
    max_depth: usize,
) -> Vec<String> {
    let mut parts = Vec::new();
    for field in ty.fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        if !fields.should_include_path(&path) {
            continue;
        }
        match field.ty {
            FieldType::Scalar => parts.push(field.name.to_string()),
            FieldType::Object(inner) => {
                if level >= max_depth {
                    continue;
                }
                let children = select_fields(inner, fields, &path, level + 1, max_depth);
                // An object with nothing selected would be invalid GraphQL.
                if !children.is_empty() {
                    parts.push(format!("{} {{ {} }}", field.name, children.join(" ")));
                }
            }
        }
    }
    parts
}
