/// Rewrite seam for the intercepting proxy in front of the browser.
///
/// Per-site resolvers plug in here to constrain stream quality in manifest
/// responses; nothing else about the traffic is touched.
pub trait ResponseRewriter: Send + Sync {
    fn should_modify(&self, uri: &str, mime: &str, charset: &str) -> bool;

    fn modify(&self, uri: &str, mime: &str, charset: &str, body: Vec<u8>) -> Vec<u8>;
}

/// Applies the first rewriter that claims a response; unclaimed responses
/// pass through unchanged.
#[derive(Default)]
pub struct RewriterSet {
    rewriters: Vec<Box<dyn ResponseRewriter>>,
}

impl RewriterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rewriter: Box<dyn ResponseRewriter>) {
        self.rewriters.push(rewriter);
    }

    pub fn process(&self, uri: &str, mime: &str, charset: &str, body: Vec<u8>) -> Vec<u8> {
        for rewriter in &self.rewriters {
            if rewriter.should_modify(uri, mime, charset) {
                return rewriter.modify(uri, mime, charset, body);
            }
        }
        body
    }
}
