//! PubMed source implementation using the NCBI E-utilities API.

use std::sync::OnceLock;

use async_trait::async_trait;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::config::UpstreamConfig;
use crate::models::{Citation, SearchRequest};
use crate::sources::{Source, SourceError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// PubMed E-utilities endpoints, relative to the configured base URL
const ESEARCH_PATH: &str = "esearch.fcgi";
const EFETCH_PATH: &str = "efetch.fcgi";

/// Longest query-string URL sent before switching to a form-encoded POST
const MAX_GET_URL_LEN: usize = 2000;

/// EFetch id counts above this are always POSTed, as NCBI asks
const MAX_GET_IDS: usize = 200;

/// PubMed research source
///
/// Issues one ESearch call for identifiers and one EFetch call for their
/// metadata. Holds only immutable configuration and a pooled client, so a single
/// instance serves any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
    retry: RetryConfig,
    identity: Vec<(&'static str, String)>,
}

impl PubMedSource {
    /// Create a PubMed source with its own connection pool
    pub fn new(config: &UpstreamConfig) -> Result<Self, SourceError> {
        let client = HttpClient::new(config.timeout())?;
        Ok(Self::with_client(client, config))
    }

    /// Create with an existing HTTP client
    pub fn with_client(client: HttpClient, config: &UpstreamConfig) -> Self {
        let identity = [
            ("api_key", config.api_key.as_ref()),
            ("email", config.email.as_ref()),
            ("tool", config.tool.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v.clone())))
        .collect();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry_config(),
            identity,
        }
    }

    fn endpoint(&self, path: &str, params: &[(&'static str, String)]) -> Result<Url, SourceError> {
        let base = format!("{}/{}", self.base_url, path);
        Url::parse_with_params(&base, params.iter().chain(self.identity.iter()))
            .map_err(|e| SourceError::Network(format!("Invalid E-utilities URL {}: {}", base, e)))
    }

    /// ESearch query parameters for a validated request
    fn build_search_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", request.term.clone()),
            ("retmax", request.retmax.to_string()),
            ("retmode", "json".to_string()),
        ];

        if let Some(sort) = request.sort {
            params.push(("sort", sort.upstream_value().to_string()));
        }
        if let Some(field) = &request.field {
            params.push(("field", field.clone()));
        }
        if let Some(datetype) = request.datetype {
            params.push(("datetype", datetype.as_str().to_string()));
        }
        if let Some(days) = request.reldate {
            params.push(("reldate", days.to_string()));
        }
        if let Some(range) = &request.date_range {
            params.push(("mindate", range.min.to_string()));
            params.push(("maxdate", range.max.to_string()));
        }

        params
    }

    fn build_fetch_params(ids: &[String]) -> Vec<(&'static str, String)> {
        vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ]
    }

    /// Send `params` to `path` and return the body, retrying transient failures
    ///
    /// Parameters travel in the query string unless the URL would grow past
    /// [`MAX_GET_URL_LEN`] or `post` is set, in which case they are sent as an
    /// `application/x-www-form-urlencoded` body.
    async fn request_text(
        &self,
        path: &str,
        params: &[(&'static str, String)],
        post: bool,
    ) -> Result<String, SourceError> {
        let mut url = self.endpoint(path, params)?;
        let form = (post || url.as_str().len() > MAX_GET_URL_LEN).then(|| {
            params
                .iter()
                .chain(self.identity.iter())
                .cloned()
                .collect::<Vec<_>>()
        });
        if form.is_some() {
            url.set_query(None);
        }

        with_retry(self.retry, || {
            let request = match &form {
                Some(form) => self.client.post(url.clone()).form(form),
                None => self.client.get(url.clone()),
            };
            async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SourceError::from_status(status, &body));
                }
                Ok(response.text().await?)
            }
        })
        .await
    }

    /// Parse an ESearch JSON response into ordered identifiers
    fn parse_search_response(json: &str) -> Result<Vec<String>, SourceError> {
        #[derive(Debug, Deserialize)]
        struct ESearchEnvelope {
            esearchresult: Option<ESearchResult>,
            error: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        struct ESearchResult {
            #[serde(default)]
            idlist: Vec<String>,
            #[serde(rename = "ERROR")]
            error: Option<String>,
        }

        let envelope: ESearchEnvelope = serde_json::from_str(json)?;

        if let Some(message) = envelope.error {
            return Err(SourceError::Rejected {
                status: 200,
                message,
            });
        }

        match envelope.esearchresult {
            Some(ESearchResult {
                error: Some(message),
                ..
            }) => Err(SourceError::Rejected {
                status: 200,
                message,
            }),
            Some(result) => Ok(result.idlist),
            None => {
                tracing::warn!("ESearch response carried no esearchresult; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Parse an EFetch XML response into citations
    ///
    /// Journal articles and book records (`PubmedBookArticle`, e.g. StatPearls
    /// chapters) may be interleaved in one set.
    fn parse_fetch_response(xml: &str) -> Result<Vec<Citation>, SourceError> {
        let cleaned = strip_inline_markup(xml);
        let set: PubmedArticleSet = from_str(&cleaned)?;

        let citations: Vec<Citation> = set
            .articles
            .into_iter()
            .filter_map(PubmedArticle::into_citation)
            .chain(set.books.into_iter().filter_map(PubmedBookArticle::into_citation))
            .collect();

        Ok(citations)
    }
}

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
    #[serde(rename = "PubmedBookArticle", default)]
    books: Vec<PubmedBookArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

impl PubmedArticle {
    fn into_citation(self) -> Option<Citation> {
        let medline = self.MedlineCitation;
        let Some(mut citation) = citation_for(medline.as_ref().and_then(|m| m.PMID.as_ref())) else {
            tracing::debug!("Skipping EFetch article without a PMID");
            return None;
        };

        if let Some(details) = medline.and_then(|m| m.Article) {
            citation.title = details
                .ArticleTitle
                .map(|t| normalize_whitespace(&t.text))
                .unwrap_or_default();
            citation.authors = format_authors(details.AuthorList);
            citation.abstract_text = format_abstract(details.Abstract);

            if let Some(journal) = details.Journal {
                citation.pub_date = journal
                    .JournalIssue
                    .and_then(|issue| issue.PubDate)
                    .and_then(format_pub_date);
                citation.journal = journal.ISOAbbreviation.or(journal.Title);
            }

            citation.doi = find_doi(details.locations);
        }

        if let Some(doi) = find_doi(
            self.PubmedData
                .and_then(|pd| pd.ArticleIdList)
                .map(|list| list.ids)
                .unwrap_or_default(),
        ) {
            citation.doi = Some(doi);
        }

        Some(citation)
    }
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<TextNode>,
    Article: Option<Article>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
    #[serde(rename = "ELocationID", default)]
    locations: Vec<TypedId>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    JournalIssue: Option<JournalIssue>,
    Title: Option<String>,
    ISOAbbreviation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

/// NCBI Bookshelf record
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedBookArticle {
    BookDocument: Option<BookDocument>,
    PubmedBookData: Option<PubmedData>,
}

impl PubmedBookArticle {
    fn into_citation(self) -> Option<Citation> {
        let document = self.BookDocument;
        let Some(mut citation) = citation_for(document.as_ref().and_then(|d| d.PMID.as_ref()))
        else {
            tracing::debug!("Skipping EFetch book record without a PMID");
            return None;
        };

        let mut ids = self
            .PubmedBookData
            .and_then(|data| data.ArticleIdList)
            .map(|list| list.ids)
            .unwrap_or_default();

        if let Some(document) = document {
            let book_title = document
                .Book
                .as_ref()
                .and_then(|book| book.BookTitle.as_ref())
                .map(|t| normalize_whitespace(&t.text))
                .filter(|t| !t.is_empty());

            citation.title = document
                .ArticleTitle
                .map(|t| normalize_whitespace(&t.text))
                .filter(|t| !t.is_empty())
                .or_else(|| book_title.clone())
                .unwrap_or_default();
            citation.journal = book_title;
            citation.pub_date = document
                .Book
                .and_then(|book| book.PubDate)
                .and_then(format_pub_date);
            citation.authors = document
                .author_lists
                .into_iter()
                .find(|list| list.list_type.as_deref() != Some("editors"))
                .map(|list| format_authors(Some(list)))
                .unwrap_or_default();
            citation.abstract_text = format_abstract(document.Abstract);

            if let Some(list) = document.ArticleIdList {
                ids.extend(list.ids);
            }
        }

        citation.doi = find_doi(ids);
        Some(citation)
    }
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct BookDocument {
    PMID: Option<TextNode>,
    ArticleIdList: Option<ArticleIdList>,
    Book: Option<Book>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    #[serde(rename = "AuthorList", default)]
    author_lists: Vec<AuthorList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Book {
    BookTitle: Option<TextNode>,
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    Season: Option<String>,
    Month: Option<String>,
    Day: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<AbstractText>,
}

#[derive(Debug, Deserialize)]
struct AbstractText {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(rename = "@Type")]
    list_type: Option<String>,
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<String>,
    Initials: Option<String>,
    ForeName: Option<String>,
    CollectiveName: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<TypedId>,
}

/// `<ArticleId IdType="doi">` and `<ELocationID EIdType="doi">`
#[derive(Debug, Deserialize)]
struct TypedId {
    #[serde(rename = "@IdType", alias = "@EIdType")]
    id_type: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

fn citation_for(pmid: Option<&TextNode>) -> Option<Citation> {
    let pmid = pmid.map(|p| p.text.trim()).filter(|p| !p.is_empty())?;
    Some(Citation::new(pmid))
}

/// "Last Initials" per person, or the group name
fn format_authors(list: Option<AuthorList>) -> Vec<String> {
    list.map(|list| {
        list.authors
            .into_iter()
            .filter_map(|author| {
                if let Some(collective) = author.CollectiveName {
                    return Some(collective);
                }
                let last = author.LastName?;
                match author.Initials.or(author.ForeName) {
                    Some(initials) => Some(format!("{} {}", last, initials)),
                    None => Some(last),
                }
            })
            .collect()
    })
    .unwrap_or_default()
}

/// Labelled sections joined by blank lines; empty sections are dropped
fn format_abstract(summary: Option<Abstract>) -> Option<String> {
    let sections: Vec<String> = summary?
        .sections
        .into_iter()
        .filter_map(|section| {
            let text = normalize_whitespace(&section.text);
            if text.is_empty() {
                return None;
            }
            Some(match section.label {
                Some(label) if !label.is_empty() => format!("{}: {}", label, text),
                _ => text,
            })
        })
        .collect();

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

fn format_pub_date(date: PubDate) -> Option<String> {
    date.MedlineDate.or_else(|| {
        let day = date.Day.map(|d| d.trim_start_matches('0').to_string());
        let parts: Vec<String> = [date.Year, date.Month.or(date.Season), day]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    })
}

fn find_doi(ids: Vec<TypedId>) -> Option<String> {
    ids.into_iter()
        .find(|id| id.id_type.as_deref() == Some("doi"))
        .map(|id| id.value.trim().to_string())
        .filter(|doi| !doi.is_empty())
}

/// Remove inline formatting tags (`<i>`, `<sup>`, ...) that split text nodes
fn strip_inline_markup(xml: &str) -> std::borrow::Cow<'_, str> {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    INLINE
        .get_or_init(|| {
            Regex::new(r"</?(?:i|b|u|sup|sub|em|strong|mml:[a-z]+)(?:\s[^>]*)?/?>")
                .expect("inline markup pattern is valid")
        })
        .replace_all(xml, "")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    async fn search_ids(&self, request: &SearchRequest) -> Result<Vec<String>, SourceError> {
        tracing::debug!(term = %request.term, retmax = request.retmax, "ESearch");

        let params = Self::build_search_params(request);
        let body = self.request_text(ESEARCH_PATH, &params, false).await?;
        let mut ids = Self::parse_search_response(&body)?;
        ids.truncate(request.retmax as usize);
        Ok(ids)
    }

    async fn fetch_citations(&self, ids: &[String]) -> Result<Vec<Citation>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(count = ids.len(), "EFetch");

        let params = Self::build_fetch_params(ids);
        let body = self
            .request_text(EFETCH_PATH, &params, ids.len() > MAX_GET_IDS)
            .await?;
        Self::parse_fetch_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateType, SortOrder};
    use std::time::Duration;

    const FETCH_XML: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2025//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_250101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">39741377</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <Volume>46</Volume>
            <PubDate><Year>2025</Year><Month>Jan</Month><Day>01</Day></PubDate>
          </JournalIssue>
          <Title>Allergy and asthma proceedings</Title>
          <ISOAbbreviation>Allergy Asthma Proc</ISOAbbreviation>
        </Journal>
        <ArticleTitle>Exploring mast cell disorders: <i>Tryptases</i> and MCAS.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Mast cells are
            tissue-resident.</AbstractText>
          <AbstractText Label="CONCLUSION">Further study is needed.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Bellanti</LastName><ForeName>Joseph A</ForeName><Initials>JA</Initials></Author>
          <Author ValidYN="Y"><LastName>Settipane</LastName><ForeName>Russell A</ForeName><Initials>RA</Initials></Author>
          <Author ValidYN="Y"><CollectiveName>Asthma Study Group</CollectiveName></Author>
        </AuthorList>
        <ELocationID EIdType="doi" ValidYN="Y">10.2500/aap.2025.46.240102</ELocationID>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">39741377</ArticleId>
        <ArticleId IdType="doi">10.2500/aap.2025.46.240102</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">38000001</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue><PubDate><MedlineDate>2019 Spring-Summer</MedlineDate></PubDate></JournalIssue>
          <Title>Journal of Examples</Title>
        </Journal>
        <ArticleTitle>Second article</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn config_for(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            max_retries: 2,
            ..UpstreamConfig::default()
        }
    }

    fn fast_source(base_url: &str) -> PubMedSource {
        let mut source = PubMedSource::new(&config_for(base_url)).unwrap();
        source.retry = source.retry.initial_delay(Duration::from_millis(5));
        source
    }

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_build_search_params() {
        let request = SearchRequest::new("asthma treatment")
            .retmax(5)
            .sort(SortOrder::JournalName)
            .field("title")
            .datetype(DateType::Pdat)
            .reldate(30);
        let params = PubMedSource::build_search_params(&request);

        assert_eq!(param(&params, "db"), Some("pubmed"));
        assert_eq!(param(&params, "term"), Some("asthma treatment"));
        assert_eq!(param(&params, "retmax"), Some("5"));
        assert_eq!(param(&params, "retmode"), Some("json"));
        assert_eq!(param(&params, "sort"), Some("JournalName"));
        assert_eq!(param(&params, "field"), Some("title"));
        assert_eq!(param(&params, "datetype"), Some("pdat"));
        assert_eq!(param(&params, "reldate"), Some("30"));
        assert_eq!(param(&params, "mindate"), None);
    }

    #[test]
    fn test_build_search_params_with_range() {
        let request = SearchRequest::new("cancer")
            .date_range("2020/01".parse().unwrap(), "2021".parse().unwrap());
        let params = PubMedSource::build_search_params(&request);

        assert_eq!(param(&params, "mindate"), Some("2020/01"));
        assert_eq!(param(&params, "maxdate"), Some("2021"));
        assert_eq!(param(&params, "sort"), None);
    }

    #[test]
    fn test_endpoint_encodes_params_and_identity() {
        let config = UpstreamConfig {
            api_key: Some("secret".to_string()),
            email: Some("dev@example.org".to_string()),
            ..config_for("https://eutils.example.org/entrez/eutils/")
        };
        let source = PubMedSource::new(&config).unwrap();
        let url = source
            .endpoint(ESEARCH_PATH, &[("term", "asthma[title] AND child".to_string())])
            .unwrap();

        assert_eq!(url.path(), "/entrez/eutils/esearch.fcgi");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("term".to_string(), "asthma[title] AND child".to_string())));
        assert!(pairs.contains(&("api_key".to_string(), "secret".to_string())));
        assert!(pairs.contains(&("email".to_string(), "dev@example.org".to_string())));
    }

    #[test]
    fn test_parse_search_response() {
        let json = r#"{"header":{"type":"esearch"},"esearchresult":{"count":"3","retmax":"3","idlist":["3","1","2"]}}"#;
        let ids = PubMedSource::parse_search_response(json).unwrap();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_parse_search_response_error_payload() {
        let json = r#"{"esearchresult":{"ERROR":"Invalid query syntax"}}"#;
        let err = PubMedSource::parse_search_response(json).unwrap_err();
        assert!(matches!(err, SourceError::Rejected { ref message, .. } if message == "Invalid query syntax"));

        let json = r#"{"error":"API key invalid"}"#;
        assert!(matches!(
            PubMedSource::parse_search_response(json),
            Err(SourceError::Rejected { .. })
        ));
    }

    #[test]
    fn test_parse_search_response_garbage() {
        assert!(matches!(
            PubMedSource::parse_search_response("<html>"),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_fetch_response() {
        let citations = PubMedSource::parse_fetch_response(FETCH_XML).unwrap();
        assert_eq!(citations.len(), 2);

        let first = &citations[0];
        assert_eq!(first.pmid, "39741377");
        assert_eq!(first.title, "Exploring mast cell disorders: Tryptases and MCAS.");
        assert_eq!(
            first.authors,
            vec!["Bellanti JA", "Settipane RA", "Asthma Study Group"]
        );
        assert_eq!(first.journal.as_deref(), Some("Allergy Asthma Proc"));
        assert_eq!(first.pub_date.as_deref(), Some("2025 Jan 1"));
        assert_eq!(first.doi.as_deref(), Some("10.2500/aap.2025.46.240102"));
        assert_eq!(
            first.abstract_text.as_deref(),
            Some("BACKGROUND: Mast cells are tissue-resident.\n\nCONCLUSION: Further study is needed.")
        );

        let second = &citations[1];
        assert_eq!(second.pmid, "38000001");
        assert_eq!(second.journal.as_deref(), Some("Journal of Examples"));
        assert_eq!(second.pub_date.as_deref(), Some("2019 Spring-Summer"));
        assert!(second.doi.is_none());
        assert!(second.abstract_text.is_none());
    }

    #[test]
    fn test_parse_fetch_response_with_book_records() {
        let xml = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation><PMID>111</PMID><Article><ArticleTitle>First article.</ArticleTitle></Article></MedlineCitation>
  </PubmedArticle>
  <PubmedBookArticle>
    <BookDocument>
      <PMID Version="1">28613492</PMID>
      <ArticleIdList><ArticleId IdType="bookaccession">NBK431085</ArticleId></ArticleIdList>
      <Book>
        <Publisher><PublisherName>StatPearls Publishing</PublisherName></Publisher>
        <BookTitle book="statpearls">StatPearls</BookTitle>
        <PubDate><Year>2025</Year><Month>Jan</Month></PubDate>
        <AuthorList Type="editors"><Author><LastName>Editor</LastName><Initials>E</Initials></Author></AuthorList>
      </Book>
      <LocationLabel Type="chapter">Asthma</LocationLabel>
      <ArticleTitle book="statpearls" part="article-17">Asthma</ArticleTitle>
      <Language>eng</Language>
      <AuthorList Type="authors">
        <Author><LastName>Sinyor</LastName><ForeName>Benjamin</ForeName><Initials>B</Initials></Author>
      </AuthorList>
      <Abstract><AbstractText>Asthma is a chronic disease.</AbstractText></Abstract>
    </BookDocument>
    <PubmedBookData>
      <ArticleIdList><ArticleId IdType="pubmed">28613492</ArticleId></ArticleIdList>
    </PubmedBookData>
  </PubmedBookArticle>
  <PubmedArticle>
    <MedlineCitation><PMID>222</PMID><Article><ArticleTitle>Second article.</ArticleTitle></Article></MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let citations = PubMedSource::parse_fetch_response(xml).unwrap();
        let pmids: Vec<&str> = citations.iter().map(|c| c.pmid.as_str()).collect();
        assert_eq!(citations.len(), 3);
        assert!(pmids.contains(&"111"));
        assert!(pmids.contains(&"222"));

        let book = citations.iter().find(|c| c.pmid == "28613492").unwrap();
        assert_eq!(book.title, "Asthma");
        assert_eq!(book.journal.as_deref(), Some("StatPearls"));
        assert_eq!(book.pub_date.as_deref(), Some("2025 Jan"));
        assert_eq!(book.authors, vec!["Sinyor B"]);
        assert_eq!(book.abstract_text.as_deref(), Some("Asthma is a chronic disease."));
        assert!(book.doi.is_none());
    }

    #[test]
    fn test_parse_fetch_response_skips_empty_abstract_sections() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>333</PMID>
      <Article>
        <ArticleTitle>Sectioned.</ArticleTitle>
        <Abstract>
          <AbstractText/>
          <AbstractText Label="RESULTS">a   b
            c</AbstractText>
          <AbstractText Label="EMPTY">   </AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>444</PMID>
      <Article><ArticleTitle>Blank.</ArticleTitle><Abstract><AbstractText/></Abstract></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let citations = PubMedSource::parse_fetch_response(xml).unwrap();
        assert_eq!(citations[0].abstract_text.as_deref(), Some("RESULTS: a b c"));
        assert!(citations[1].abstract_text.is_none());
    }

    #[test]
    fn test_parse_fetch_response_empty_set() {
        let citations =
            PubMedSource::parse_fetch_response("<PubmedArticleSet></PubmedArticleSet>").unwrap();
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn test_search_ids_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/esearch.fcgi")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("db".into(), "pubmed".into()),
                mockito::Matcher::UrlEncoded("term".into(), "asthma treatment".into()),
                mockito::Matcher::UrlEncoded("retmax".into(), "2".into()),
                mockito::Matcher::UrlEncoded("retmode".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"esearchresult":{"idlist":["22","11"]}}"#)
            .expect(1)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let ids = source
            .search_ids(&SearchRequest::new("asthma treatment").retmax(2))
            .await
            .unwrap();

        assert_eq!(ids, vec!["22", "11"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_citations_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("id".into(), "39741377,38000001".into()),
                mockito::Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_status(200)
            .with_body(FETCH_XML)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let ids = vec!["39741377".to_string(), "38000001".to_string()];
        let citations = source.fetch_citations(&ids).await.unwrap();

        assert_eq!(citations.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_fail() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/esearch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let err = source
            .search_ids(&SearchRequest::new("asthma"))
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Server { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_fail_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/esearch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body("Invalid term")
            .expect(1)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let err = source
            .search_ids(&SearchRequest::new("asthma"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SourceError::Rejected {
                status: 400,
                message: "Invalid term".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_many_ids_posts_form() {
        let ids: Vec<String> = (0..500).map(|n| (30_000_000 + n).to_string()).collect();

        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/efetch.fcgi")
            .match_query(mockito::Matcher::Missing)
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("db".into(), "pubmed".into()),
                mockito::Matcher::UrlEncoded("id".into(), ids.join(",")),
                mockito::Matcher::UrlEncoded("retmode".into(), "xml".into()),
                mockito::Matcher::UrlEncoded("tool".into(), "pubmed-mcp".into()),
            ]))
            .with_body(FETCH_XML)
            .expect(1)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let citations = source.fetch_citations(&ids).await.unwrap();

        assert_eq!(citations.len(), 2);
        post.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_long_search_term_posts_form() {
        let term = vec!["asthma[tiab]"; 300].join(" OR ");

        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/esearch.fcgi")
            .match_body(mockito::Matcher::UrlEncoded("term".into(), term.clone()))
            .with_body(r#"{"esearchresult":{"idlist":["5"]}}"#)
            .expect(1)
            .create_async()
            .await;

        let source = fast_source(&server.url());
        let ids = source.search_ids(&SearchRequest::new(term)).await.unwrap();

        assert_eq!(ids, vec!["5"]);
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_posted_requests_retry_transient_failures() {
        let ids: Vec<String> = (0..201).map(|n| n.to_string()).collect();

        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/efetch.fcgi")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let err = fast_source(&server.url())
            .fetch_citations(&ids)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Server { status: 502, .. }));
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_with_no_ids_skips_network() {
        let source = fast_source("http://127.0.0.1:9");
        let citations = source.fetch_citations(&[]).await.unwrap();
        assert!(citations.is_empty());
    }
}
