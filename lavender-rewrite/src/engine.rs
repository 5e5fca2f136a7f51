use std::path::Path;

use indexmap::IndexMap;
use lavender_index::{Index, IndexError, Label};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::{
    consistent_hash::ConsistentHash,
    error::{RewriteError, RewriteResult},
    processor::Rewriter,
};

/// Characters escaped when a lavendelized path is turned into a URL path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// CDN endpoints by scheme, keyed by host name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nodes {
    pub http: IndexMap<String, Url>,
    pub https: IndexMap<String, Url>,
}

impl Nodes {
    /// Parses a node list: one URI per line, blank lines and `#` comments
    /// ignored. The first URI per scheme and host wins.
    pub fn parse(text: &str) -> RewriteResult<Self> {
        let mut nodes = Nodes::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: String| RewriteError::InvalidNode {
                line: number + 1,
                uri: line.to_string(),
                reason,
            };

            let uri = if line.ends_with('/') {
                line.to_string()
            } else {
                format!("{line}/")
            };
            let url = Url::parse(&uri).map_err(|e| invalid(e.to_string()))?;
            let Some(host) = url.host_str().map(str::to_string) else {
                return Err(invalid("missing host".to_string()));
            };
            let map = match url.scheme() {
                "http" => &mut nodes.http,
                "https" => &mut nodes.https,
                other => return Err(invalid(format!("unsupported scheme `{other}`"))),
            };
            if map.contains_key(&host) {
                tracing::debug!("ignoring duplicate node {uri}");
                continue;
            }
            map.insert(host, url);
        }
        Ok(nodes)
    }

    pub fn load(path: &Path) -> RewriteResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RewriteError::NodesFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Host names placed on the ring: the http nodes, or the https nodes for
    /// an https-only fleet.
    fn ring_hosts(&self) -> impl Iterator<Item = &String> {
        if self.http.is_empty() {
            self.https.keys()
        } else {
            self.http.keys()
        }
    }

    fn for_scheme(&self, scheme: &str) -> &IndexMap<String, Url> {
        if scheme == "https" {
            &self.https
        } else {
            &self.http
        }
    }
}

/// Maps references found in served documents to their CDN URLs.
///
/// Immutable after construction; a reload builds a new engine.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    index: Index,
    nodes: Nodes,
    hash: ConsistentHash,
}

impl RewriteEngine {
    pub fn new(index: Index, nodes: Nodes, replicas: usize) -> Self {
        let hash = ConsistentHash::new(replicas, nodes.ring_hosts());
        Self { index, nodes, hash }
    }

    /// Loads the index and node list. A missing index file serves as an empty
    /// index, so nothing is rewritten until the first publish.
    pub fn load(index_file: &Path, nodes_file: &Path, replicas: usize) -> RewriteResult<Self> {
        let index = match Index::load(index_file) {
            Ok(index) => index,
            Err(IndexError::NotFound(path)) => {
                tracing::warn!("index {} does not exist, nothing will be rewritten", path.display());
                Index::new()
            }
            Err(e) => return Err(e.into()),
        };
        let nodes = Nodes::load(nodes_file)?;
        tracing::info!(
            "rewrite engine loaded: {} labels, {} http nodes, {} https nodes",
            index.len(),
            nodes.http.len(),
            nodes.https.len()
        );
        Ok(Self::new(index, nodes, replicas))
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn replicas(&self) -> usize {
        self.hash.replicas()
    }

    /// Rewrites `reference` as found in a document served at `base`. Anything
    /// that is not a published resource comes back unchanged.
    pub fn rewrite(&self, reference: &str, base: &Url, context_path: &str) -> String {
        match self.try_rewrite(reference, base, context_path) {
            Ok(Some(url)) => url.into(),
            Ok(None) => reference.to_string(),
            Err(e) => {
                tracing::warn!("not rewriting `{reference}`: {e}");
                reference.to_string()
            }
        }
    }

    fn try_rewrite(
        &self,
        reference: &str,
        base: &Url,
        context_path: &str,
    ) -> RewriteResult<Option<Url>> {
        let unquoted = strip_quotes(reference.trim());
        let resolved = match base.join(unquoted) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!("cannot parse `{reference}`: {e}");
                return Ok(None);
            }
        };
        if resolved.origin() != base.origin() {
            return Ok(None);
        }

        let Ok(path) = percent_decode_str(resolved.path()).decode_utf8() else {
            return Ok(None);
        };
        let Some(label) = self.index.lookup(strip_context_path(&path, context_path)) else {
            return Ok(None);
        };

        let mut url = self.calculate_url(label, base)?;
        url.set_query(resolved.query());
        url.set_fragment(resolved.fragment());
        Ok(Some(url))
    }

    /// The CDN URL of `label` for documents served at `base`.
    pub fn calculate_url(&self, label: &Label, base: &Url) -> RewriteResult<Url> {
        let node = self.hash.node_for_hash(&label.md5())?;
        let scheme = if base.scheme() == "https" { "https" } else { "http" };
        let endpoint = self
            .nodes
            .for_scheme(scheme)
            .get(node)
            .ok_or_else(|| RewriteError::UnknownNode {
                scheme: scheme.to_string(),
                node: node.to_string(),
            })?;

        let relative = format!(
            "./{}",
            utf8_percent_encode(label.lavendelized_path().trim_start_matches('/'), PATH_SEGMENT)
        );
        Ok(endpoint.join(&relative)?)
    }

    /// A [`Rewriter`] for one document.
    pub fn bind<'a>(&'a self, base: &'a Url, context_path: &'a str) -> BoundRewriter<'a> {
        BoundRewriter {
            engine: self,
            base,
            context_path,
        }
    }
}

/// [`RewriteEngine::rewrite`] with the document's base URL and context path
/// fixed, as handed to the stream processors.
#[derive(Debug, Clone, Copy)]
pub struct BoundRewriter<'a> {
    engine: &'a RewriteEngine,
    base: &'a Url,
    context_path: &'a str,
}

impl Rewriter for BoundRewriter<'_> {
    fn rewrite(&self, reference: &str) -> String {
        self.engine.rewrite(reference, self.base, self.context_path)
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

/// The index key for `path`: `path` without the context path if it starts
/// with it, keeping the leading `/`.
fn strip_context_path<'p>(path: &'p str, context_path: &str) -> &'p str {
    let context = context_path.trim_matches('/');
    if context.is_empty() {
        return path;
    }
    path.strip_prefix('/')
        .and_then(|p| p.strip_prefix(context))
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use lavender_common::Md5;

    use super::*;

    const NODES: &str = "\
# cdn fleet
http://cdn1.example.com
http://cdn2.example.com:8080/static

https://cdn1.example.com
https://cdn2.example.com/static/
http://cdn1.example.com/ignored/
";

    fn engine() -> RewriteEngine {
        let mut index = Index::new();
        let logo = Md5::digest(b"logo");
        index
            .add(Label::new("/img/logo.png", "web/abc/def/logo.png", logo))
            .unwrap();
        index
            .add(Label::new("/img/copy.png", "web/abc/def/logo.png", logo))
            .unwrap();
        index
            .add(Label::new("/css/site.css", "web/123/456/site.css", Md5::digest(b"css")))
            .unwrap();
        RewriteEngine::new(index, Nodes::parse(NODES).unwrap(), 200)
    }

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn node_list_is_deduplicated_per_scheme() {
        let nodes = Nodes::parse(NODES).unwrap();
        assert_eq!(nodes.http.len(), 2);
        assert_eq!(nodes.https.len(), 2);
        assert_eq!(nodes.http["cdn1.example.com"].as_str(), "http://cdn1.example.com/");
        assert_eq!(
            nodes.http["cdn2.example.com"].as_str(),
            "http://cdn2.example.com:8080/static/"
        );
    }

    #[test]
    fn invalid_nodes_name_the_line() {
        let err = Nodes::parse("http://ok.example.com\nftp://bad.example.com").unwrap_err();
        assert!(matches!(err, RewriteError::InvalidNode { line: 2, .. }), "{err}");
        assert!(Nodes::parse("not a uri").is_err());
    }

    #[test]
    fn published_resource_is_rewritten() {
        let engine = engine();
        let out = engine.rewrite("/img/logo.png", &base("http://www.example.com/index.html"), "/");
        assert!(
            out == "http://cdn1.example.com/web/abc/def/logo.png"
                || out == "http://cdn2.example.com:8080/static/web/abc/def/logo.png",
            "{out}"
        );
    }

    #[test]
    fn relative_and_quoted_references_resolve_against_base() {
        let engine = engine();
        let base = base("http://www.example.com/img/page.html");
        let absolute = engine.rewrite("/img/logo.png", &base, "/");
        assert_eq!(engine.rewrite("logo.png", &base, "/"), absolute);
        assert_eq!(engine.rewrite("'logo.png'", &base, "/"), absolute);
        assert_eq!(engine.rewrite("\"../img/logo.png\"", &base, "/"), absolute);
    }

    #[test]
    fn query_and_fragment_are_preserved() {
        let engine = engine();
        let out = engine.rewrite(
            "/img/logo.png?param=1#top",
            &base("http://www.example.com/"),
            "/",
        );
        assert!(out.ends_with("/web/abc/def/logo.png?param=1#top"), "{out}");
    }

    #[test]
    fn unknown_references_pass_through_verbatim() {
        let engine = engine();
        let base = base("http://www.example.com/");
        for reference in [
            "/img/missing.png",
            "'/img/missing.png'",
            "http://elsewhere.example.com/img/logo.png",
            "https://www.example.com/img/logo.png",
            "mailto:someone@example.com",
            "http://[broken",
            "",
        ] {
            assert_eq!(engine.rewrite(reference, &base, "/"), reference);
        }
    }

    #[test]
    fn same_md5_maps_to_same_node() {
        let engine = engine();
        let base = base("http://www.example.com/");
        assert_eq!(
            engine.rewrite("/img/logo.png", &base, "/"),
            engine.rewrite("/img/copy.png", &base, "/")
        );
    }

    #[test]
    fn https_documents_get_https_nodes() {
        let engine = engine();
        let out = engine.rewrite("/css/site.css", &base("https://www.example.com/"), "/");
        assert!(
            out == "https://cdn1.example.com/web/123/456/site.css"
                || out == "https://cdn2.example.com/static/web/123/456/site.css",
            "{out}"
        );
    }

    #[test]
    fn context_path_is_stripped() {
        let engine = engine();
        let base = base("http://www.example.com/shop/index.html");
        let plain = engine.rewrite("/img/logo.png", &base, "/");
        assert_eq!(engine.rewrite("/shop/img/logo.png", &base, "/shop"), plain);
        assert_eq!(engine.rewrite("img/logo.png", &base, "/shop/"), plain);
        // outside the context path the path is looked up as it is
        assert_eq!(engine.rewrite("/img/logo.png", &base, "/shop"), plain);
        assert_eq!(
            engine.rewrite("/shopping/img/logo.png", &base, "/shop"),
            "/shopping/img/logo.png"
        );
    }

    #[test]
    fn percent_encoded_paths_are_decoded_for_lookup() {
        let mut index = Index::new();
        index
            .add(Label::new("/img/a b.png", "web/a/b/a b.png", Md5::digest(b"ab")))
            .unwrap();
        let engine = RewriteEngine::new(index, Nodes::parse("http://cdn.example.com").unwrap(), 10);
        assert_eq!(
            engine.rewrite("/img/a%20b.png", &base("http://www.example.com/"), "/"),
            "http://cdn.example.com/web/a/b/a%20b.png"
        );
    }

    #[test]
    fn missing_scheme_family_passes_through() {
        let mut index = Index::new();
        index
            .add(Label::new("/a.png", "web/a.png", Md5::digest(b"a")))
            .unwrap();
        let engine = RewriteEngine::new(index, Nodes::parse("http://cdn.example.com").unwrap(), 10);
        assert_eq!(
            engine.rewrite("/a.png", &base("https://www.example.com/"), "/"),
            "/a.png"
        );

        let https_only = RewriteEngine::new(
            engine.index().clone(),
            Nodes::parse("https://secure.example.com").unwrap(),
            10,
        );
        assert_eq!(
            https_only.rewrite("/a.png", &base("https://www.example.com/"), "/"),
            "https://secure.example.com/web/a.png"
        );
    }

    #[test]
    fn bound_rewriter_delegates() {
        let engine = engine();
        let base = base("http://www.example.com/");
        let bound = engine.bind(&base, "/");
        assert_eq!(bound.rewrite("/img/logo.png"), engine.rewrite("/img/logo.png", &base, "/"));
    }
}
