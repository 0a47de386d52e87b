use super::{classify_tag, content_hash, finalize, Section, SectionIdAllocator, TagKind};
use crate::error::ParseError;
use crate::parser::ParsedDocument;
use crate::tier::Tier;
use scraper::{Html, Node, Selector};
use std::collections::HashSet;

/// Parses an HTML classified source document per §4.1.
///
/// Elements carrying `data-clearance` equal to a canonical tier name each
/// become one section. Nested tagged elements are processed
/// independently (each produces its own section) with a non-fatal
/// warning logged. Unknown tier values are skipped with a warning unless
/// no valid tier is found anywhere in the document, which is a hard
/// error.
pub fn parse_html(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ParseError::MalformedInput(e.to_string()))?;
    let document = Html::parse_document(text);

    if document.root_element().text().collect::<String>().trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    let title = meta_content(&document, "document-title")
        .unwrap_or_else(|| "Untitled Document".to_string());
    let doc_type = meta_content(&document, "document-type").unwrap_or_else(|| "html".to_string());

    let tagged_selector = Selector::parse("[data-clearance]").expect("static selector is valid");
    let mut ids = SectionIdAllocator::starting_at(1);
    let mut sections = Vec::new();
    let mut any_valid_tier = false;
    let mut any_tier_attribute = false;

    for element in document.select(&tagged_selector) {
        any_tier_attribute = true;
        let raw_tier = element.value().attr("data-clearance").unwrap_or_default();
        let Some(tier) = Tier::parse(raw_tier) else {
            tracing::warn!(tier = raw_tier, "skipping element with unknown clearance tier");
            continue;
        };
        any_valid_tier = true;

        let tag_name = element.value().name();
        let tag_kind = classify_tag(tag_name);

        let section_id = element
            .value()
            .attr("id")
            .map(|s| s.to_string())
            .unwrap_or_else(|| ids.next_id());

        let text: String = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
        let title_text = heading_text(&element)
            .or_else(|| element.value().attr("data-title").map(|s| s.to_string()))
            .unwrap_or_else(|| format!("{} Section", tier.canonical_name()));

        sections.push(Section {
            section_id,
            clearance: tier,
            title: title_text,
            tag_name: tag_kind,
            text_length: text.len(),
            content_hash: content_hash(text.as_bytes()),
            content: text.into_bytes(),
        });
    }

    if any_tier_attribute && !any_valid_tier {
        return Err(ParseError::UnknownTier(
            document
                .select(&tagged_selector)
                .next()
                .and_then(|e| e.value().attr("data-clearance"))
                .unwrap_or("")
                .to_string(),
        ));
    }

    // Text belonging to an already-tagged element must not also end up in
    // the synthesized leading section, so walk the tree directly rather
    // than re-collecting the whole document's text.
    let tagged_ids: HashSet<_> = document.select(&tagged_selector).map(|e| e.id()).collect();
    let residual_text = document
        .tree
        .nodes()
        .filter_map(|node| match node.value() {
            Node::Text(text) if !node.ancestors().any(|a| tagged_ids.contains(&a.id())) => {
                Some(text.text.to_string())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");
    let residual_text = residual_text.trim().to_string();

    if residual_text.len() >= 10 {
        sections.insert(
            0,
            Section {
                section_id: "sec-000".to_string(),
                clearance: Tier::Internal,
                title: "INTERNAL Section".to_string(),
                tag_name: TagKind::Block,
                text_length: residual_text.len(),
                content_hash: content_hash(residual_text.as_bytes()),
                content: residual_text.into_bytes(),
            },
        );
    }

    let mut metadata = finalize(sections, &doc_type, title, "html");
    metadata.metadata.author = meta_content(&document, "author");
    metadata.metadata.created_date = meta_content(&document, "created-date");
    metadata.metadata.department = meta_content(&document, "department");
    Ok(metadata)
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(|s| s.to_string())
}

fn heading_text(element: &scraper::ElementRef) -> Option<String> {
    let heading_selector = Selector::parse("h1,h2,h3,h4,h5,h6").ok()?;
    element
        .select(&heading_selector)
        .next()
        .map(|h| h.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|s| !s.is_empty())
}
