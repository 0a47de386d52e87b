use super::{classify_tag, content_hash, finalize, Section, SectionIdAllocator, TagKind};
use crate::error::ParseError;
use crate::parser::ParsedDocument;
use crate::tier::Tier;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// Parses a DOCX classified source document per §4.1.
///
/// Two detection paths are applied, both contributing sections:
/// paragraph styles whose normalized name matches a tier (the preferred
/// path, with consecutive same-tier paragraphs coalesced), and
/// structured-content-control tags of the form `clearance:<TIER>`.
/// Character-level run styles additionally mark inline sections.
pub fn parse_docx(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::MalformedInput(e.to_string()))?;

    let document_xml = read_entry(&mut archive, "word/document.xml")
        .ok_or(ParseError::EmptyDocument)?;
    let styles_xml = read_entry(&mut archive, "word/styles.xml").unwrap_or_default();
    let core_xml = read_entry(&mut archive, "docProps/core.xml").unwrap_or_default();

    let style_tiers = parse_style_tiers(&styles_xml);
    let (title, created_date, author) = parse_core_props(&core_xml);

    let mut ids = SectionIdAllocator::starting_at(1);
    let mut sections = Vec::new();
    parse_document_body(&document_xml, &style_tiers, &mut ids, &mut sections)?;

    if sections.is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    let mut parsed = finalize(sections, "docx", title.unwrap_or_else(|| "Untitled Document".into()), "docx");
    parsed.metadata.author = author;
    parsed.metadata.created_date = created_date;
    Ok(parsed)
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut file = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).ok()?;
    Some(buf)
}

fn normalize_style_name(name: &str) -> String {
    name.trim().to_ascii_uppercase().replace([' ', '_'], "-")
}

/// Maps a docx style id (e.g. `"Heading1"`) to the canonical tier its
/// normalized display name matches, if any.
fn parse_style_tiers(styles_xml: &[u8]) -> HashMap<String, Tier> {
    let mut reader = Reader::from_reader(styles_xml);
    reader.config_mut().trim_text(true);
    let mut map = HashMap::new();

    let mut current_style_id: Option<String> = None;
    let mut current_name: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_name(&e.name());
                match local.as_str() {
                    "style" => {
                        current_style_id = attr_value(&e, "styleId");
                        current_name = None;
                    }
                    "name" => {
                        current_name = attr_value(&e, "val");
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(&e.name()) == "style" {
                    if let (Some(id), Some(name)) = (current_style_id.take(), current_name.take()) {
                        if let Some(tier) = Tier::parse(&normalize_style_name(&name)) {
                            map.insert(id, tier);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    map
}

fn parse_core_props(core_xml: &[u8]) -> (Option<String>, Option<String>, Option<String>) {
    let mut reader = Reader::from_reader(core_xml);
    reader.config_mut().trim_text(true);
    let mut title = None;
    let mut created = None;
    let mut creator = None;
    let mut current_tag: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => current_tag = Some(local_name(&e.name())),
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    match current_tag.as_deref() {
                        Some("title") => title = Some(text.to_string()),
                        Some("created") => created = Some(text.to_string()),
                        Some("creator") => creator = Some(text.to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => current_tag = None,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    (title, created, creator)
}

struct PendingParagraph {
    tier: Tier,
    text: String,
}

fn parse_document_body(
    document_xml: &[u8],
    style_tiers: &HashMap<String, Tier>,
    ids: &mut SectionIdAllocator,
    sections: &mut Vec<Section>,
) -> Result<(), ParseError> {
    let mut reader = Reader::from_reader(document_xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut pending: Option<PendingParagraph> = None;
    let mut current_paragraph_style: Option<Tier> = None;
    let mut current_paragraph_text = String::new();

    let mut sdt_tag_value: Option<String> = None;
    let mut sdt_alias: Option<String> = None;
    let mut in_sdt_content = false;
    let mut sdt_text = String::new();

    let mut in_run_with_tier_style = false;
    let mut run_style_tier: Option<Tier> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_name(&e.name());
                match local.as_str() {
                    "p" => {
                        current_paragraph_style = None;
                        current_paragraph_text.clear();
                    }
                    "pStyle" => {
                        if let Some(val) = attr_value(&e, "val") {
                            current_paragraph_style = style_tiers.get(&val).copied();
                        }
                    }
                    "rStyle" => {
                        if let Some(val) = attr_value(&e, "val") {
                            run_style_tier = style_tiers.get(&val).copied();
                            in_run_with_tier_style = run_style_tier.is_some();
                        }
                    }
                    "r" => {
                        run_style_tier = None;
                        in_run_with_tier_style = false;
                    }
                    "sdt" => {
                        sdt_tag_value = None;
                        sdt_alias = None;
                        sdt_text.clear();
                    }
                    "tag" => sdt_tag_value = attr_value(&e, "val"),
                    "alias" => sdt_alias = attr_value(&e, "val"),
                    "sdtContent" => in_sdt_content = true,
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    if in_sdt_content {
                        sdt_text.push_str(&text);
                    }
                    current_paragraph_text.push_str(&text);
                    if in_run_with_tier_style {
                        if let Some(tier) = run_style_tier {
                            let text = text.trim().to_string();
                            if text.len() >= 1 {
                                sections.push(Section {
                                    section_id: ids.next_id(),
                                    clearance: tier,
                                    title: format!("{} Section", tier.canonical_name()),
                                    tag_name: TagKind::Inline,
                                    text_length: text.len(),
                                    content_hash: content_hash(text.as_bytes()),
                                    content: text.into_bytes(),
                                });
                            }
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(&e.name());
                match local.as_str() {
                    "sdt" => {
                        if let Some(tag) = sdt_tag_value.take() {
                            if let Some(tier_str) = tag.strip_prefix("clearance:") {
                                if let Some(tier) = Tier::parse(tier_str) {
                                    let text = sdt_text.trim().to_string();
                                    sections.push(Section {
                                        section_id: ids.next_id(),
                                        clearance: tier,
                                        title: sdt_alias
                                            .clone()
                                            .unwrap_or_else(|| format!("{} Section", tier.canonical_name())),
                                        tag_name: TagKind::Section,
                                        text_length: text.len(),
                                        content_hash: content_hash(text.as_bytes()),
                                        content: text.into_bytes(),
                                    });
                                }
                            }
                        }
                        sdt_alias = None;
                    }
                    "sdtContent" => in_sdt_content = false,
                    "p" => {
                        let text = current_paragraph_text.trim().to_string();
                        match (current_paragraph_style, &mut pending) {
                            (Some(tier), Some(p)) if p.tier.level() == tier.level() => {
                                p.text.push(' ');
                                p.text.push_str(&text);
                            }
                            (Some(tier), _) => {
                                if let Some(finished) = pending.take() {
                                    flush_paragraph(finished, ids, sections);
                                }
                                pending = Some(PendingParagraph { tier, text });
                            }
                            (None, _) => {
                                if let Some(finished) = pending.take() {
                                    flush_paragraph(finished, ids, sections);
                                }
                            }
                        }
                        current_paragraph_style = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedInput(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(finished) = pending.take() {
        flush_paragraph(finished, ids, sections);
    }

    Ok(())
}

fn flush_paragraph(p: PendingParagraph, ids: &mut SectionIdAllocator, sections: &mut Vec<Section>) {
    let text = p.text.trim().to_string();
    sections.push(Section {
        section_id: ids.next_id(),
        clearance: p.tier,
        title: format!("{} Section", p.tier.canonical_name()),
        tag_name: TagKind::Block,
        text_length: text.len(),
        content_hash: content_hash(text.as_bytes()),
        content: text.into_bytes(),
    });
}

fn local_name(name: &quick_xml::name::QName) -> String {
    let full = std::str::from_utf8(name.as_ref()).unwrap_or("");
    full.rsplit(':').next().unwrap_or(full).to_string()
}

fn attr_value(e: &quick_xml::events::BytesStart, local: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let key = local_name(&a.key);
        if key == local {
            a.unescape_value().ok().map(|v| v.to_string())
        } else {
            None
        }
    })
}
