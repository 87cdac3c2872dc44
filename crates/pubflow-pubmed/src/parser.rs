//! PubMed XML parser using quick-xml
//!
//! Streaming parser for `PubmedArticleSet` documents, as served both by
//! E-utilities efetch and by the update files.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::citation::{Author, Citation, Journal, extract_emails};

/// Result of parsing a PubMed XML document.
/// Contains both new/updated citations and deleted PMIDs.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub citations: Vec<Citation>,
    pub deleted_pmids: Vec<String>,
}

/// Parse PubMed citations from XML content.
/// Also extracts DeleteCitation entries (PMIDs to be removed).
pub fn parse_pubmed_xml(xml: &str) -> Result<ParseResult> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = ParseResult::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"PubmedArticle" => {
                match parse_article(&mut reader) {
                    Ok(citation) if !citation.pmid.is_empty() => result.citations.push(citation),
                    Ok(_) => log::debug!("Skipping article without PMID"),
                    Err(e) => log::debug!("Failed to parse article: {e}"),
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"DeleteCitation" => {
                parse_delete_citation(&mut reader, &mut result.deleted_pmids)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("XML parse error"),
            _ => {}
        }
        buf.clear();
    }

    Ok(result)
}

/// Parse `<DeleteCitation>` block: extract PMID values.
fn parse_delete_citation(reader: &mut Reader<&[u8]>, deleted: &mut Vec<String>) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"PMID" => {
                let pmid = read_text(reader)?.trim().to_string();
                if !pmid.is_empty() {
                    deleted.push(pmid);
                }
            }
            Event::End(e) if e.name().as_ref() == b"DeleteCitation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn parse_article(reader: &mut Reader<&[u8]>) -> Result<Citation> {
    let mut citation = Citation::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"MedlineCitation" => parse_medline_citation(reader, &mut citation)?,
                b"PubmedData" => parse_pubmed_data(reader, &mut citation)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedArticle" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(citation)
}

fn parse_medline_citation(reader: &mut Reader<&[u8]>, citation: &mut Citation) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                // Own PMID comes first; later PMIDs belong to nested lists
                b"PMID" if citation.pmid.is_empty() => citation.pmid = read_text(reader)?,
                b"Article" => parse_article_element(reader, citation)?,
                b"KeywordList" => citation.keyword_list.extend(parse_keyword_list(reader)?),
                b"CommentsCorrectionsList" => skip_element(reader, b"CommentsCorrectionsList")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"MedlineCitation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_element(reader: &mut Reader<&[u8]>, citation: &mut Citation) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Journal" => citation.journal = parse_journal(reader)?,
                b"ArticleTitle" => {
                    citation.title = Some(read_text_content(reader, b"ArticleTitle")?)
                }
                b"Abstract" => citation.abstract_text = Some(parse_abstract(reader)?),
                b"AuthorList" => citation.author_list = parse_author_list(reader)?,
                b"PublicationTypeList" => {
                    citation.publication_type_list = parse_pub_type_list(reader)?
                }
                b"ELocationID" if attr(&e, b"EIdType").as_deref() == Some("doi") => {
                    let doi = read_text(reader)?;
                    citation.doi.get_or_insert(doi);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_journal(reader: &mut Reader<&[u8]>) -> Result<Journal> {
    let mut journal = Journal::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Title" => journal.title = Some(read_text(reader)?),
                b"ISOAbbreviation" => journal.iso_abbreviation = Some(read_text(reader)?),
                b"Volume" => journal.volume = Some(read_text(reader)?),
                b"Issue" => journal.issue = Some(read_text(reader)?),
                b"PubDate" => parse_pub_date(reader, &mut journal)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Journal" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(journal)
}

/// Date parts are kept as written; coercion happens where they are used.
fn parse_pub_date(reader: &mut Reader<&[u8]>, journal: &mut Journal) -> Result<()> {
    let mut buf = Vec::new();
    let mut medline_date = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Year" => journal.pub_year = Some(read_text(reader)?),
                b"Month" => journal.pub_month = Some(read_text(reader)?),
                b"Day" => journal.pub_day = Some(read_text(reader)?),
                b"MedlineDate" => medline_date = Some(read_text(reader)?),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubDate" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // e.g. "1998 Dec-1999 Jan": year only
    if journal.pub_year.is_none() {
        if let Some(date) = medline_date {
            let year: String = date.chars().take(4).collect();
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                journal.pub_year = Some(year);
            }
        }
    }

    Ok(())
}

fn parse_abstract(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text_parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"AbstractText" => {
                text_parts.push(read_text_content(reader, b"AbstractText")?);
            }
            Event::End(e) if e.name().as_ref() == b"Abstract" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text_parts.join(" "))
}

fn parse_author_list(reader: &mut Reader<&[u8]>) -> Result<Vec<Author>> {
    let mut authors = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Author" => {
                authors.push(parse_author(reader)?);
            }
            Event::End(e) if e.name().as_ref() == b"AuthorList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(authors)
}

fn parse_author(reader: &mut Reader<&[u8]>) -> Result<Author> {
    let mut author = Author::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"LastName" => author.last_name = Some(read_text(reader)?),
                b"ForeName" => author.fore_name = Some(read_text(reader)?),
                b"Initials" => author.initials = Some(read_text(reader)?),
                b"CollectiveName" => author.collective_name = Some(read_text(reader)?),
                b"AffiliationInfo" => {
                    if let Some(aff) = parse_affiliation(reader)? {
                        author.affiliations.push(aff);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let emails: Vec<String> = author
        .affiliations
        .iter()
        .flat_map(|aff| extract_emails(aff))
        .collect();
    if !emails.is_empty() {
        author.emails = Some(crate::citation::unique_in_order(emails));
    }

    Ok(author)
}

fn parse_affiliation(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let mut affiliation = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Affiliation" => {
                affiliation = Some(read_text_content(reader, b"Affiliation")?);
            }
            Event::End(e) if e.name().as_ref() == b"AffiliationInfo" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(affiliation)
}

/// Publication types by MeSH UI; entries without a UI are skipped.
fn parse_pub_type_list(reader: &mut Reader<&[u8]>) -> Result<Vec<String>> {
    let mut types = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"PublicationType" => {
                let ui = attr(&e, b"UI");
                let name = read_text(reader)?;
                match ui {
                    Some(ui) => types.push(ui),
                    None => log::debug!("Publication type without UI: {name}"),
                }
            }
            Event::End(e) if e.name().as_ref() == b"PublicationTypeList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(types)
}

fn parse_keyword_list(reader: &mut Reader<&[u8]>) -> Result<Vec<String>> {
    let mut keywords = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Keyword" => {
                keywords.push(read_text_content(reader, b"Keyword")?);
            }
            Event::End(e) if e.name().as_ref() == b"KeywordList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(keywords)
}

fn parse_pubmed_data(reader: &mut Reader<&[u8]>, citation: &mut Citation) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"ArticleIdList" => parse_article_id_list(reader, citation)?,
                // References carry their own ArticleIdLists
                b"ReferenceList" => skip_element(reader, b"ReferenceList")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_id_list(reader: &mut Reader<&[u8]>, citation: &mut Citation) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"ArticleId" => {
                let id_type = attr(&e, b"IdType").unwrap_or_default();
                let value = read_text(reader)?;
                match id_type.as_str() {
                    "doi" => citation.doi = Some(value),
                    "pmc" => citation.pmc = Some(value),
                    _ => {}
                }
            }
            Event::End(e) if e.name().as_ref() == b"ArticleIdList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Attribute value by key, lossily decoded.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

pub(crate) fn skip_element(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Read text content until next end tag
pub(crate) fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::End(_) => break,
            Event::Start(_) => {
                // Nested markup (<i>, <sup>, ...)
                text.push_str(&read_text(reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Read text content of a specific element, handling nested tags
pub(crate) fn read_text_content(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => {
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
                text.push_str(&e.unescape()?);
            }
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31452104</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <ISSN IssnType="Electronic">1097-4172</ISSN>
          <JournalIssue CitedMedium="Internet">
            <Volume>178</Volume>
            <Issue>6</Issue>
            <PubDate>
              <Year>2019</Year>
              <Month>Sep</Month>
              <Day>05</Day>
            </PubDate>
          </JournalIssue>
          <Title>Cell</Title>
          <ISOAbbreviation>Cell</ISOAbbreviation>
        </Journal>
        <ArticleTitle>A <i>pathway</i> for signalling.</ArticleTitle>
        <ELocationID EIdType="doi" ValidYN="Y">10.1016/j.cell.2019.08.001</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND">First part.</AbstractText>
          <AbstractText Label="RESULTS">Second part.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y">
            <LastName>Smith</LastName>
            <ForeName>John</ForeName>
            <Initials>J</Initials>
            <AffiliationInfo>
              <Affiliation>University of Test, Toronto. Electronic address: john.smith@test.ca.</Affiliation>
            </AffiliationInfo>
          </Author>
          <Author ValidYN="Y">
            <LastName>Doe</LastName>
            <ForeName>Jane</ForeName>
            <Initials>J</Initials>
          </Author>
          <Author ValidYN="Y">
            <CollectiveName>Pathway Consortium</CollectiveName>
          </Author>
        </AuthorList>
        <PublicationTypeList>
          <PublicationType UI="D016428">Journal Article</PublicationType>
          <PublicationType UI="D013485">Research Support, Non-U.S. Gov't</PublicationType>
        </PublicationTypeList>
      </Article>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="CommentIn">
          <RefSource>Cell. 2019</RefSource>
          <PMID Version="1">99999999</PMID>
        </CommentsCorrections>
      </CommentsCorrectionsList>
      <KeywordList Owner="NOTNLM">
        <Keyword MajorTopicYN="N">signalling</Keyword>
      </KeywordList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31452104</ArticleId>
        <ArticleId IdType="pmc">PMC6736425</ArticleId>
        <ArticleId IdType="doi">10.1016/j.cell.2019.08.001</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference>
          <Citation>Other paper.</Citation>
          <ArticleIdList>
            <ArticleId IdType="pmc">PMC0000001</ArticleId>
          </ArticleIdList>
        </Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn sample() -> Citation {
        let mut result = parse_pubmed_xml(SAMPLE_XML).unwrap();
        assert_eq!(result.citations.len(), 1);
        result.citations.remove(0)
    }

    #[test]
    fn parse_identifiers() {
        let c = sample();
        assert_eq!(c.pmid, "31452104");
        assert_eq!(c.pmc.as_deref(), Some("PMC6736425"));
        assert_eq!(c.doi.as_deref(), Some("10.1016/j.cell.2019.08.001"));
    }

    #[test]
    fn parse_title_and_abstract() {
        let c = sample();
        assert_eq!(c.title.as_deref(), Some("A pathway for signalling."));
        assert_eq!(c.abstract_text.as_deref(), Some("First part. Second part."));
    }

    #[test]
    fn parse_journal_keeps_raw_date_parts() {
        let j = sample().journal;
        assert_eq!(j.title.as_deref(), Some("Cell"));
        assert_eq!(j.volume.as_deref(), Some("178"));
        assert_eq!(j.pub_year.as_deref(), Some("2019"));
        assert_eq!(j.pub_month.as_deref(), Some("Sep"));
        assert_eq!(j.pub_day.as_deref(), Some("05"));
    }

    #[test]
    fn parse_authors_with_emails() {
        let authors = sample().author_list;
        assert_eq!(authors.len(), 3);
        assert_eq!(authors[0].last_name.as_deref(), Some("Smith"));
        assert_eq!(
            authors[0].emails,
            Some(vec!["john.smith@test.ca".to_string()])
        );
        assert!(authors[1].emails.is_none());
        assert_eq!(
            authors[2].collective_name.as_deref(),
            Some("Pathway Consortium")
        );
    }

    #[test]
    fn parse_publication_type_uis() {
        assert_eq!(
            sample().publication_type_list,
            vec!["D016428".to_string(), "D013485".to_string()]
        );
    }

    #[test]
    fn parse_keywords() {
        assert_eq!(sample().keyword_list, vec!["signalling".to_string()]);
    }

    #[test]
    fn medline_date_yields_year() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
<PMID>1</PMID><Article><Journal><JournalIssue><PubDate>
<MedlineDate>1998 Dec-1999 Jan</MedlineDate>
</PubDate></JournalIssue></Journal></Article>
</MedlineCitation></PubmedArticle></PubmedArticleSet>"#;
        let result = parse_pubmed_xml(xml).unwrap();
        assert_eq!(result.citations[0].journal.pub_year.as_deref(), Some("1998"));
        assert!(result.citations[0].journal.pub_month.is_none());
    }

    #[test]
    fn parse_empty_set() {
        let result = parse_pubmed_xml("<PubmedArticleSet></PubmedArticleSet>").unwrap();
        assert!(result.citations.is_empty());
        assert!(result.deleted_pmids.is_empty());
    }

    #[test]
    fn parse_delete_citation_block() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<PubmedArticleSet>
  <DeleteCitation>
    <PMID Version="1">12345</PMID>
    <PMID Version="1">67890</PMID>
  </DeleteCitation>
</PubmedArticleSet>"#;

        let result = parse_pubmed_xml(xml).unwrap();
        assert!(result.citations.is_empty());
        assert_eq!(result.deleted_pmids, vec!["12345", "67890"]);
    }

    #[test]
    fn parse_multiple_articles() {
        let xml = r#"<PubmedArticleSet>
<PubmedArticle><MedlineCitation><PMID>1</PMID></MedlineCitation></PubmedArticle>
<PubmedArticle><MedlineCitation><PMID>2</PMID></MedlineCitation></PubmedArticle>
</PubmedArticleSet>"#;
        let pmids: Vec<_> = parse_pubmed_xml(xml)
            .unwrap()
            .citations
            .into_iter()
            .map(|c| c.pmid)
            .collect();
        assert_eq!(pmids, vec!["1", "2"]);
    }
}
