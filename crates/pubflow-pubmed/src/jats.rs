//! PMC article parser (JATS XML)
//!
//! Reads `pmc-articleset` documents as served by efetch with `db=pmc`.
//! PMC records matter here for what PubMed lacks: author emails and
//! corresponding-author notes.

use std::collections::HashMap;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::citation::{Author, Citation, Correspondence, Journal, extract_emails, unique_in_order};
use crate::parser::{attr, read_text, read_text_content, skip_element};

/// Contributor as read, before corresp references are resolved.
#[derive(Default)]
struct Contrib {
    author: Author,
    emails: Vec<String>,
    corresp_rids: Vec<String>,
}

#[derive(Default)]
struct ArticleState {
    citation: Citation,
    contribs: Vec<Contrib>,
    /// corresp id -> entry
    corresp: Vec<(Option<String>, Correspondence)>,
}

/// Parse every `<article>` of a PMC article set. Articles without a PMID
/// cannot be matched back to PubMed records and are skipped.
pub fn parse_pmc_xml(xml: &str) -> Result<Vec<Citation>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut citations = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"article" => {
                match parse_article(&mut reader) {
                    Ok(citation) if !citation.pmid.is_empty() => citations.push(citation),
                    Ok(citation) => {
                        log::debug!("Skipping PMC article without PMID ({:?})", citation.pmc)
                    }
                    Err(e) => log::debug!("Failed to parse PMC article: {e}"),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("XML parse error"),
            _ => {}
        }
        buf.clear();
    }

    Ok(citations)
}

fn parse_article(reader: &mut Reader<&[u8]>) -> Result<Citation> {
    let mut state = ArticleState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"body" | b"back" | b"sub-article" | b"floats-group" => {
                    let end = e.name().as_ref().to_vec();
                    skip_element(reader, &end)?;
                }
                b"article-id" => {
                    let id_type = attr(&e, b"pub-id-type").unwrap_or_default();
                    let value = read_text(reader)?.trim().to_string();
                    set_article_id(&mut state.citation, &id_type, value);
                }
                b"journal-title" if state.citation.journal.title.is_none() => {
                    state.citation.journal.title = Some(read_text_content(reader, b"journal-title")?);
                }
                b"abbrev-journal-title" if state.citation.journal.iso_abbreviation.is_none() => {
                    state.citation.journal.iso_abbreviation = Some(read_text(reader)?);
                }
                b"article-title" if state.citation.title.is_none() => {
                    state.citation.title = Some(read_text_content(reader, b"article-title")?);
                }
                b"volume" if state.citation.journal.volume.is_none() => {
                    state.citation.journal.volume = Some(read_text(reader)?);
                }
                b"issue" if state.citation.journal.issue.is_none() => {
                    state.citation.journal.issue = Some(read_text(reader)?);
                }
                b"pub-date" => parse_pub_date(reader, &mut state.citation.journal)?,
                b"abstract" if state.citation.abstract_text.is_none() => {
                    state.citation.abstract_text = Some(read_text_content(reader, b"abstract")?);
                }
                b"contrib" => {
                    let is_author = attr(&e, b"contrib-type").as_deref() == Some("author");
                    let contrib = parse_contrib(reader)?;
                    if is_author {
                        state.contribs.push(contrib);
                    }
                }
                b"corresp" => {
                    let id = attr(&e, b"id");
                    state.corresp.push((id, parse_corresp(reader)?));
                }
                b"kwd" => state.citation.keyword_list.push(read_text_content(reader, b"kwd")?),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(state.finish())
}

fn set_article_id(citation: &mut Citation, id_type: &str, value: String) {
    if value.is_empty() {
        return;
    }
    match id_type {
        "pmid" => citation.pmid = value,
        "pmc" | "pmcid" => {
            let pmc = if value.starts_with("PMC") {
                value
            } else {
                format!("PMC{value}")
            };
            citation.pmc = Some(pmc);
        }
        "doi" => citation.doi = Some(value),
        _ => {}
    }
}

impl ArticleState {
    fn finish(self) -> Citation {
        let Self {
            mut citation,
            contribs,
            corresp,
        } = self;

        let corresp_emails: HashMap<&str, &[String]> = corresp
            .iter()
            .filter_map(|(id, c)| Some((id.as_deref()?, c.emails.as_deref()?)))
            .collect();

        citation.author_list = contribs
            .into_iter()
            .map(|contrib| {
                let mut author = contrib.author;
                let mut emails = contrib.emails;
                for rid in &contrib.corresp_rids {
                    if let Some(found) = corresp_emails.get(rid.as_str()) {
                        emails.extend(found.iter().cloned());
                    }
                }
                if !emails.is_empty() {
                    author.emails = Some(unique_in_order(emails));
                }
                author
            })
            .collect();
        citation.correspondence = corresp.into_iter().map(|(_, c)| c).collect();
        citation
    }
}

fn parse_contrib(reader: &mut Reader<&[u8]>) -> Result<Contrib> {
    let mut contrib = Contrib::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"surname" => contrib.author.last_name = Some(read_text(reader)?),
                b"given-names" => {
                    let given = read_text(reader)?;
                    contrib.author.initials = Some(initials(&given));
                    contrib.author.fore_name = Some(given);
                }
                b"collab" => {
                    contrib.author.collective_name = Some(read_text_content(reader, b"collab")?)
                }
                b"email" => contrib.emails.push(read_text(reader)?.trim().to_string()),
                b"aff" => contrib
                    .author
                    .affiliations
                    .push(read_text_content(reader, b"aff")?),
                b"xref" => {
                    if let Some(rid) = corresp_rid(&e) {
                        contrib.corresp_rids.push(rid);
                    }
                    skip_element(reader, b"xref")?;
                }
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"xref" => {
                if let Some(rid) = corresp_rid(&e) {
                    contrib.corresp_rids.push(rid);
                }
            }
            Event::End(e) if e.name().as_ref() == b"contrib" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(contrib)
}

fn corresp_rid(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    if attr(e, b"ref-type").as_deref() != Some("corresp") {
        return None;
    }
    attr(e, b"rid")
}

fn initials(given: &str) -> String {
    given
        .split([' ', '-'])
        .filter_map(|part| part.chars().next())
        .filter(|c| c.is_alphabetic())
        .collect()
}

/// `<corresp>` text becomes the notes; `<email>` children (or bare
/// addresses in the text) become the emails.
fn parse_corresp(reader: &mut Reader<&[u8]>) -> Result<Correspondence> {
    let mut buf = Vec::new();
    let mut notes = String::new();
    let mut emails = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"email" => {
                let email = read_text(reader)?.trim().to_string();
                push_note(&mut notes, &email);
                emails.push(email);
            }
            Event::Start(_) => depth += 1,
            Event::Text(e) => push_note(&mut notes, &e.unescape()?),
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == b"corresp" {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if emails.is_empty() {
        emails = extract_emails(&notes);
    }

    Ok(Correspondence {
        emails: (!emails.is_empty()).then(|| unique_in_order(emails)),
        notes: (!notes.is_empty()).then_some(notes),
    })
}

fn push_note(notes: &mut String, text: &str) {
    if !notes.is_empty() && !notes.ends_with(' ') {
        notes.push(' ');
    }
    notes.push_str(text);
}

/// First `pub-date` carrying a year wins.
fn parse_pub_date(reader: &mut Reader<&[u8]>, journal: &mut Journal) -> Result<()> {
    let mut buf = Vec::new();
    let (mut year, mut month, mut day) = (None, None, None);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"year" => year = Some(read_text(reader)?),
                b"month" => month = Some(read_text(reader)?),
                b"day" => day = Some(read_text(reader)?),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"pub-date" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if journal.pub_year.is_none() && year.is_some() {
        journal.pub_year = year;
        journal.pub_month = month;
        journal.pub_day = day;
    }

    Ok(())
}
