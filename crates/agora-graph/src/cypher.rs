//! Cypher statement generation for Neo4j-compatible graph databases.
//!
//! Statements are parameterised: node properties travel as `$props`, uuids
//! as `$uuid` / `$uuids`, and edge timestamps as separate parameters.

use crate::edges::{EdgeDefinition, EdgeType};
use crate::schema::NodeLabel;

pub const CLEAR_GRAPH: &str = "MATCH (n) DETACH DELETE n";
pub const SHOW_CONSTRAINTS: &str = "SHOW CONSTRAINTS YIELD name RETURN name";
pub const SHOW_INDEXES: &str = "SHOW INDEXES YIELD name, type WHERE type <> 'LOOKUP' RETURN name";
pub const NODE_COUNTS: &str = "MATCH (n) RETURN labels(n)[0] AS key, count(*) AS total";
pub const EDGE_COUNTS: &str = "MATCH ()-[r]->() RETURN type(r) AS key, count(*) AS total";

/// Create-or-merge a node. On match the incoming properties are merged into
/// the existing ones. `$props` must not carry `created_at`; it is only set on
/// create.
pub fn upsert_node(label: NodeLabel, with_embedding: bool) -> String {
    let x = label.variable();
    let mut q = format!(
        "MERGE ({x}:{label} {{uuid: $uuid}}) \
         ON CREATE SET {x} = $props, {x}.created_at = $created_at \
         ON MATCH SET {x} += $props"
    );
    if with_embedding {
        q.push_str(&format!(
            " WITH {x} CALL db.create.setNodeVectorProperty({x}, 'embedding', $embedding)"
        ));
    }
    q.push_str(&format!(" RETURN properties({x}) AS props, {x}.embedding AS embedding"));
    q
}

pub fn fetch_node(label: NodeLabel) -> String {
    let x = label.variable();
    format!("MATCH ({x}:{label} {{uuid: $uuid}}) RETURN properties({x}) AS props, {x}.embedding AS embedding")
}

pub fn fetch_nodes(label: NodeLabel) -> String {
    let x = label.variable();
    format!(
        "MATCH ({x}:{label}) WHERE {x}.uuid IN $uuids \
         RETURN properties({x}) AS props, {x}.embedding AS embedding"
    )
}

pub fn list_nodes(label: NodeLabel) -> String {
    let x = label.variable();
    format!(
        "MATCH ({x}:{label}) RETURN properties({x}) AS props, {x}.embedding AS embedding \
         ORDER BY {x}.created_at, {x}.uuid SKIP $skip LIMIT $limit"
    )
}

/// Delete a node together with all of its relationships.
pub fn delete_node(label: NodeLabel) -> String {
    let x = label.variable();
    format!("MATCH ({x}:{label} {{uuid: $uuid}}) DETACH DELETE {x} RETURN count(*) AS deleted")
}

/// Merge a relationship between two existing nodes.
pub fn merge_edge(definition: &EdgeDefinition) -> String {
    let rel = definition.rel;
    let mut on_create = String::from(
        "r.created_at = $created_at, r.updated_at = $updated_at, \
         r.valid_from = $valid_from, r.valid_to = $valid_to",
    );
    let mut on_match = String::from(
        "r.updated_at = $updated_at, \
         r.valid_from = coalesce($valid_from, r.valid_from), \
         r.valid_to = coalesce($valid_to, r.valid_to)",
    );
    let mut count = "null";
    if definition.counted {
        on_create.push_str(", r.count = 1");
        on_match.push_str(", r.count = coalesce(r.count, 0) + 1");
        count = "r.count";
    }
    format!(
        "MATCH (f:{from} {{uuid: $from_uuid}}), (t:{to} {{uuid: $to_uuid}}) \
         MERGE (f)-[r:{rel}]->(t) \
         ON CREATE SET {on_create} \
         ON MATCH SET {on_match} \
         RETURN r.created_at AS created_at, r.updated_at AS updated_at, \
         r.valid_from AS valid_from, r.valid_to AS valid_to, {count} AS count",
        from = definition.from,
        to = definition.to,
    )
}

pub fn edges_from(rel: Option<EdgeType>) -> String {
    let pattern = match rel {
        Some(rel) => format!("[r:{rel}]"),
        None => "[r]".to_string(),
    };
    format!(
        "MATCH (f {{uuid: $uuid}})-{pattern}->(t) \
         RETURN labels(f)[0] AS from_label, type(r) AS rel, \
         t.uuid AS to_uuid, labels(t)[0] AS to_label, \
         r.created_at AS created_at, r.updated_at AS updated_at, \
         r.valid_from AS valid_from, r.valid_to AS valid_to, r.count AS count \
         ORDER BY rel, to_uuid"
    )
}

/// Constraints, property indexes and vector indexes for a fresh database.
pub fn init_statements(embedding_dimensions: usize) -> Vec<String> {
    let mut statements = Vec::new();

    for label in NodeLabel::ALL {
        let x = label.variable();
        let lower = label.as_str().to_lowercase();
        statements.push(format!(
            "CREATE CONSTRAINT {lower}_uuid IF NOT EXISTS FOR ({x}:{label}) REQUIRE {x}.uuid IS UNIQUE"
        ));
    }

    for label in NodeLabel::ALL {
        let x = label.variable();
        let lower = label.as_str().to_lowercase();
        statements.push(format!(
            "CREATE INDEX {lower}_name IF NOT EXISTS FOR ({x}:{label}) ON ({x}.name)"
        ));
    }

    for label in [NodeLabel::User, NodeLabel::Room, NodeLabel::Message, NodeLabel::Community] {
        let x = label.variable();
        let lower = label.as_str().to_lowercase();
        statements.push(format!(
            "CREATE INDEX {lower}_platform_id IF NOT EXISTS FOR ({x}:{label}) ON ({x}.platform_id)"
        ));
    }

    for label in NodeLabel::ALL.into_iter().filter(|l| l.has_embedding()) {
        let x = label.variable();
        let lower = label.as_str().to_lowercase();
        statements.push(format!(
            "CREATE VECTOR INDEX {lower}_embedding IF NOT EXISTS FOR ({x}:{label}) ON ({x}.embedding) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {embedding_dimensions}, \
             `vector.similarity_function`: 'cosine'}}}}"
        ));
    }

    statements
}

/// All init statements as one script, for `cypher-shell`.
pub fn schema_script(embedding_dimensions: usize) -> String {
    let mut script = init_statements(embedding_dimensions).join(";\n");
    script.push_str(";\n");
    script
}

pub fn drop_constraint(name: &str) -> String {
    format!("DROP CONSTRAINT {} IF EXISTS", quote_identifier(name))
}

pub fn drop_index(name: &str) -> String {
    format!("DROP INDEX {} IF EXISTS", quote_identifier(name))
}

/// Backtick-quote a schema object name.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::edge_definition;

    #[test]
    fn test_upsert_node_with_embedding() {
        let q = upsert_node(NodeLabel::Message, true);
        assert!(q.starts_with("MERGE (m:Message {uuid: $uuid})"));
        assert!(q.contains("ON CREATE SET m = $props, m.created_at = $created_at"));
        assert!(q.contains("ON MATCH SET m += $props"));
        assert!(q.contains("db.create.setNodeVectorProperty(m, 'embedding', $embedding)"));
    }

    #[test]
    fn test_upsert_node_without_embedding() {
        let q = upsert_node(NodeLabel::Preference, false);
        assert!(!q.contains("setNodeVectorProperty"));
        assert!(q.ends_with("RETURN properties(p) AS props, p.embedding AS embedding"));
    }

    #[test]
    fn test_fetch_and_delete() {
        assert!(fetch_node(NodeLabel::User).starts_with("MATCH (u:User {uuid: $uuid})"));
        assert!(fetch_nodes(NodeLabel::Topic).contains("WHERE t.uuid IN $uuids"));
        assert!(delete_node(NodeLabel::Room).contains("DETACH DELETE r"));
    }

    #[test]
    fn test_merge_edge_plain() {
        let def = edge_definition(NodeLabel::Message, EdgeType::Mentions, NodeLabel::Entity).unwrap();
        let q = merge_edge(def);
        assert!(q.starts_with(
            "MATCH (f:Message {uuid: $from_uuid}), (t:Entity {uuid: $to_uuid}) MERGE (f)-[r:MENTIONS]->(t)"
        ));
        assert!(!q.contains("r.count"));
        assert!(q.ends_with("null AS count"));
    }

    #[test]
    fn test_merge_edge_counted() {
        let def = edge_definition(NodeLabel::User, EdgeType::PostedIn, NodeLabel::Room).unwrap();
        let q = merge_edge(def);
        assert!(q.contains("r.count = coalesce(r.count, 0) + 1"));
        assert!(q.ends_with("r.count AS count"));
    }

    #[test]
    fn test_init_statements() {
        let statements = init_statements(384);
        let constraints = statements.iter().filter(|s| s.contains("CONSTRAINT")).count();
        assert_eq!(constraints, NodeLabel::ALL.len());
        let vectors: Vec<_> = statements.iter().filter(|s| s.contains("VECTOR INDEX")).collect();
        assert_eq!(vectors.len(), 6);
        assert!(vectors[0].contains("`vector.dimensions`: 384"));
        assert!(!statements.iter().any(|s| s.contains("community_embedding")));
    }

    #[test]
    fn test_drop_statements_quote_names() {
        assert_eq!(drop_index("user_name"), "DROP INDEX `user_name` IF EXISTS");
        assert_eq!(drop_constraint("we`ird"), "DROP CONSTRAINT `we``ird` IF EXISTS");
    }

    #[test]
    fn test_edges_from_filter() {
        assert!(edges_from(Some(EdgeType::Posts)).contains("-[r:POSTS]->"));
        assert!(edges_from(None).contains("-[r]->"));
    }
}
