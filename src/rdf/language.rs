//! RDF serialization languages understood by the proxy.

use oxigraph::io::RdfFormat;
use std::fmt;

/// Serialization languages the proxy can parse from origins and render to
/// HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    RdfXml,
    N3,
    Turtle,
}

impl Language {
    /// Order in which languages are offered to origins. Origins may pick
    /// their response encoding from it, so it never changes between requests.
    pub const ACCEPT_PRIORITY: [Language; 3] = [Language::RdfXml, Language::N3, Language::Turtle];

    /// Language used when the client does not ask for a supported one.
    pub const DEFAULT: Language = Language::RdfXml;

    /// Primary media type, used for `Content-Type` on HTTP responses.
    pub fn mime_type(self) -> &'static str {
        match self {
            Language::RdfXml => "application/rdf+xml",
            Language::N3 => "text/n3",
            Language::Turtle => "text/turtle",
        }
    }

    /// All media types that select this language in an `Accept` header.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Language::RdfXml => &["application/rdf+xml"],
            Language::N3 => &["text/n3", "application/n3", "text/rdf+n3"],
            Language::Turtle => &["text/turtle", "application/turtle", "application/x-turtle"],
        }
    }

    /// Look up a language by media type (parameters and case are ignored).
    pub fn from_mime_type(mime: &str) -> Option<Language> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        Language::ACCEPT_PRIORITY
            .into_iter()
            .find(|language| language.aliases().contains(&essence.as_str()))
    }

    /// Look up a language by file extension.
    pub fn from_extension(extension: &str) -> Option<Language> {
        match extension.to_ascii_lowercase().as_str() {
            "rdf" | "xml" | "owl" => Some(Language::RdfXml),
            "n3" => Some(Language::N3),
            "ttl" => Some(Language::Turtle),
            _ => None,
        }
    }

    /// Format used to parse payloads in this language.
    pub(crate) fn parser_format(self) -> RdfFormat {
        match self {
            Language::RdfXml => RdfFormat::RdfXml,
            Language::N3 => RdfFormat::N3,
            Language::Turtle => RdfFormat::Turtle,
        }
    }

    /// Format used to write graphs in this language.
    ///
    /// N3 output is restricted to its Turtle subset.
    pub(crate) fn serializer_format(self) -> RdfFormat {
        match self {
            Language::RdfXml => RdfFormat::RdfXml,
            Language::N3 | Language::Turtle => RdfFormat::Turtle,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}
