use crate::{
    catalog::RuleDefinition,
    error::{QProfileError, Result},
    types::RuleKey,
};
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, Schema, Value, STORED, STRING, TEXT},
    Index, IndexWriter, ReloadPolicy, TantivyDocument,
};

#[derive(Debug, Clone)]
pub struct RuleHit {
    pub key: RuleKey,
    pub score: f32,
}

struct Fields {
    key: Field,
    repository: Field,
    name: Field,
    description: Field,
    tags: Field,
    body: Field,
}

/// Ephemeral in-RAM full-text index over a slice of rule definitions.
pub struct RuleTextIndex {
    index: Index,
    reader: tantivy::IndexReader,
    fields: Fields,
}

impl RuleTextIndex {
    /// Indexed fields:
    /// - `key`         — STRING (exact, stored) — `key:"squid:S001"` scoping
    /// - `repository`  — STRING (exact) — `repository:squid` scoping
    /// - `name`        — TEXT (tokenized)
    /// - `description` — TEXT (tokenized)
    /// - `tags`        — TEXT, one value per tag
    /// - `body`        — TEXT — the key split into repository and rule tokens
    pub fn build(rules: &[&RuleDefinition]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer(15_000_000)
            .map_err(|e| QProfileError::Search(e.to_string()))?;

        for rule in rules {
            let mut doc = TantivyDocument::default();
            doc.add_text(fields.key, rule.key.to_string());
            doc.add_text(fields.repository, &rule.key.repository);
            doc.add_text(fields.name, &rule.name);
            if let Some(desc) = &rule.description {
                doc.add_text(fields.description, desc);
            }
            for tag in &rule.tags {
                doc.add_text(fields.tags, tag);
            }
            doc.add_text(
                fields.body,
                format!("{} {}", rule.key.repository, rule.key.rule),
            );
            writer
                .add_document(doc)
                .map_err(|e| QProfileError::Search(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| QProfileError::Search(e.to_string()))?;

        // Built once, read many times: no reload needed
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| QProfileError::Search(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// BM25 search over name, description, tags and key tokens. Terms are
    /// AND-ed by default. A query that fails to parse matches nothing.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<RuleHit>> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let searcher = self.reader.searcher();

        let default_fields = vec![
            self.fields.name,
            self.fields.description,
            self.fields.tags,
            self.fields.body,
        ];
        let mut parser = QueryParser::for_index(&self.index, default_fields);
        parser.set_conjunction_by_default();

        let query = match parser.parse_query(query_str) {
            Ok(q) => q,
            Err(_) => return Ok(vec![]),
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| QProfileError::Search(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_addr)
                .map_err(|e| QProfileError::Search(e.to_string()))?;
            let Some(raw) = doc.get_first(self.fields.key).and_then(|v| v.as_str()) else {
                continue;
            };
            hits.push(RuleHit {
                key: raw.parse()?,
                score,
            });
        }
        Ok(hits)
    }
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let key = builder.add_text_field("key", STRING | STORED);
    let repository = builder.add_text_field("repository", STRING);
    let name = builder.add_text_field("name", TEXT);
    let description = builder.add_text_field("description", TEXT);
    let tags = builder.add_text_field("tags", TEXT);
    let body = builder.add_text_field("body", TEXT);

    let schema = builder.build();
    let fields = Fields {
        key,
        repository,
        name,
        description,
        tags,
        body,
    };
    (schema, fields)
}
