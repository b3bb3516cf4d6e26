//! Eager loading orchestration
//!
//! Requested relations are expanded (through relations also request their
//! pivot path), grouped into a tree, then loaded level by level: one fetch
//! per relation, whatever the number of entities. Through relations only
//! project data loaded by their pivot, so they run last.

use indexmap::IndexMap;
use std::sync::Arc;

use super::Schema;
use crate::document::Document;
use crate::error::OrmResult;
use crate::path;
use crate::query::{EmbedSpec, FetchOptions};
use crate::relationships::{Link, RelationKind};
use crate::value::Value;
use crate::BoxFuture;

/// A requested relation with its query options and nested requests
#[derive(Debug, Clone, Default)]
pub struct EmbedNode {
    pub options: FetchOptions,
    pub children: EmbedTree,
}

/// Requested relations grouped by their first segment
pub type EmbedTree = IndexMap<String, EmbedNode>;

impl EmbedNode {
    /// Nested requests as dotted specs, relative to this node
    pub fn flatten(&self) -> Vec<EmbedSpec> {
        let mut specs = Vec::new();
        flatten_into(&self.children, "", &mut specs);
        specs
    }
}

fn flatten_into(tree: &EmbedTree, prefix: &str, specs: &mut Vec<EmbedSpec>) {
    for (name, node) in tree {
        let full = path::join(prefix, name);
        specs.push(EmbedSpec {
            path: full.clone(),
            options: node.options.clone(),
        });
        flatten_into(&node.children, &full, specs);
    }
}

fn insert(tree: &mut EmbedTree, spec_path: &str, options: &FetchOptions) {
    match spec_path.split_once('.') {
        None => {
            tree.entry(spec_path.to_string()).or_default().options = options.clone();
        }
        Some((head, rest)) => {
            let node = tree.entry(head.to_string()).or_default();
            insert(&mut node.children, rest, options);
        }
    }
}

impl Schema {
    /// Add the pivot path of every requested through relation, keeping the
    /// request itself. `tags` becomes `images_tags.tag` and `tags`.
    pub fn expand(self: &Arc<Self>, specs: &[EmbedSpec]) -> OrmResult<Vec<EmbedSpec>> {
        let mut expanded: Vec<EmbedSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            let (name, rest) = self.split_relation(&spec.path);
            let relation = self.relation(&name)?;
            if relation.kind() == RelationKind::HasManyThrough {
                if let Some((through, using)) = relation.through_config() {
                    let pivot_path = path::join(&path::join(&through, &using), rest.unwrap_or_default());
                    if !expanded.iter().any(|existing| existing.path == pivot_path) {
                        expanded.push(EmbedSpec {
                            path: pivot_path,
                            options: spec.options.clone(),
                        });
                    }
                }
            }
            if !expanded.iter().any(|existing| existing.path == spec.path) {
                expanded.push(spec.clone());
            }
        }
        Ok(expanded)
    }

    /// Group dotted relation requests into a tree. Through relations also
    /// get their pivot inserted as an intermediate node.
    pub fn treeify(self: &Arc<Self>, specs: &[EmbedSpec]) -> OrmResult<EmbedTree> {
        let mut tree = EmbedTree::new();
        for spec in specs {
            let (name, rest) = self.split_relation(&spec.path);
            let relation = self.relation(&name)?;
            if relation.kind() == RelationKind::HasManyThrough {
                if let Some((through, using)) = relation.through_config() {
                    let pivot = tree.entry(through).or_default();
                    pivot.children.entry(using).or_default();
                }
            }
            let node = tree.entry(name).or_default();
            match rest {
                Some(rest) => insert(&mut node.children, rest, &spec.options),
                None => node.options = spec.options.clone(),
            }
        }
        Ok(tree)
    }

    /// Split a requested path into the relation name and the remainder.
    /// Embedded relations are matched on their full dotted name.
    fn split_relation<'p>(&self, spec_path: &'p str) -> (String, Option<&'p str>) {
        let mut end = spec_path.find('.').unwrap_or(spec_path.len());
        loop {
            let candidate = &spec_path[..end];
            let rest = (end < spec_path.len()).then(|| &spec_path[end + 1..]);
            let embedded = self
                .relation_config(candidate)
                .is_some_and(|spec| spec.link == Link::Embedded);
            match (embedded, rest) {
                (true, Some(rest)) => {
                    let (next_head, _) = path::head(rest).unwrap_or((rest, None));
                    let deeper = format!("{candidate}.{next_head}");
                    if self.relation_config(&deeper).is_some() || self.has_nested(&deeper) {
                        end += 1 + next_head.len();
                        continue;
                    }
                    return (candidate.to_string(), Some(rest));
                }
                _ => return (candidate.to_string(), rest),
            }
        }
    }

    /// Eager load `specs` on `entities`
    pub fn embed<'a>(
        self: &'a Arc<Self>,
        entities: &'a [Document],
        specs: &'a [EmbedSpec],
    ) -> BoxFuture<'a, OrmResult<()>> {
        Box::pin(async move {
            if entities.is_empty() || specs.is_empty() {
                return Ok(());
            }
            let expanded = self.expand(specs)?;
            let tree = self.treeify(&expanded)?;

            let mut deferred = Vec::new();
            for (name, node) in &tree {
                let relation = self.relation(name)?;
                if relation.kind() == RelationKind::HasManyThrough {
                    deferred.push((name.clone(), node.options.clone()));
                    continue;
                }

                let related = if relation.embedded() {
                    embedded_children(entities, relation.field())?
                } else {
                    tracing::debug!(
                        "Embedding `{}` on {} `{}` entities",
                        name,
                        entities.len(),
                        self.name()
                    );
                    relation.embed(entities, &node.options).await?
                };

                let nested = node.flatten();
                if nested.is_empty() || related.is_empty() {
                    continue;
                }
                if relation.embedded() {
                    // Relations below an embedded one live on this schema
                    let prefixed: Vec<EmbedSpec> = nested
                        .into_iter()
                        .map(|spec| EmbedSpec {
                            path: path::join(name, &spec.path),
                            options: spec.options,
                        })
                        .filter(|spec| self.relation_config(&spec.path).is_some())
                        .collect();
                    self.embed(&related, &prefixed).await?;
                } else {
                    let target = relation.to_schema()?;
                    target.embed(&related, &nested).await?;
                }
            }

            for (name, options) in deferred {
                let relation = self.relation(&name)?;
                tracing::debug!("Projecting through relation `{}` on `{}`", name, self.name());
                relation.embed(entities, &options).await?;
            }
            Ok(())
        })
    }
}

fn embedded_children(entities: &[Document], field: &str) -> OrmResult<Vec<Document>> {
    let mut children = Vec::new();
    for entity in entities {
        match entity.get(field)? {
            Value::Document(doc) => children.push(doc),
            Value::Collection(collection) => children.extend(collection.documents()),
            _ => {}
        }
    }
    Ok(children)
}
