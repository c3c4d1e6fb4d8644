//! HTML transform pipeline.
//!
//! # Data Flow
//! ```text
//! origin body
//!     → downgrade_links    (blunt https:// → http:// text pass)
//!     → unwrap_noscript    (hostile + strip_js)
//!     → strip_scripts      (hostile + strip_js)
//!     → strip_styles       (hostile + strip_css)
//!     → prune_images       (hostile: drop SVG, collect images to probe)
//!     → ImageSizeCache     (hostile + max inline width: probe once per URL)
//!     → repair_document    (img sizing, root-relative hrefs, redirect_uri)
//!     → restore_apostrophes
//!     → minify_document    (hostile only, best effort)
//! ```
//!
//! # Design Decisions
//! - Every pass is a separate rewrite over the whole document so ordering
//!   stays explicit and each pass can be tested alone
//! - Image probing happens between passes because rewriter handlers are sync

use std::borrow::Cow;

use lol_html::html_content::ContentType;
use lol_html::{
    doc_comments, element, text, DocumentContentHandlers, ElementContentHandlers, HtmlRewriter,
    Selector, Settings,
};
use url::Url;

use crate::error::Result;
use crate::policy::{HostPolicyStore, Trust};
use crate::transform::css;
use crate::transform::probe::{ImageProber, ImageSizeCache};

type Handlers<'h> = Vec<(Cow<'static, Selector>, ElementContentHandlers<'h>)>;

/// Per-request switches for the HTML path.
#[derive(Debug, Clone, Copy)]
pub struct HtmlOptions {
    pub trust: Trust,
    pub strip_js: bool,
    pub strip_css: bool,
    pub max_inline_width: Option<u32>,
}

/// Run the full pipeline over an origin document.
///
/// `base` is the URL the client requested; relative image sources resolve
/// against it and root-relative links are anchored to its origin.
pub async fn transform_html<P>(
    body: &str,
    base: &Url,
    options: &HtmlOptions,
    policy: &HostPolicyStore,
    prober: &P,
) -> Result<String>
where
    P: ImageProber + ?Sized,
{
    let hostile = options.trust.is_hostile();
    let mut html = downgrade_links(body);

    if hostile && options.strip_js {
        html = unwrap_noscript(&html)?;
        html = strip_scripts(&html)?;
    }
    if hostile && options.strip_css {
        html = strip_styles(&html)?;
    }

    let max_width = options.max_inline_width.filter(|_| hostile);
    let mut sizes = ImageSizeCache::default();
    if hostile {
        let pruned = prune_images(&html, base)?;
        html = pruned.html;
        if max_width.is_some() {
            sizes = ImageSizeCache::probe_all(prober, &pruned.needs_probe).await;
        }
    }

    let html = repair_document(&html, base, max_width, &sizes, policy)?;
    let html = restore_apostrophes(&html);

    if hostile {
        Ok(minify_document(&html, options.strip_css))
    } else {
        Ok(html)
    }
}

fn rewrite(html: &str, handlers: Handlers<'_>) -> Result<String> {
    rewrite_document(html, handlers, Vec::new())
}

fn rewrite_document<'h>(
    html: &str,
    handlers: Handlers<'h>,
    document_handlers: Vec<DocumentContentHandlers<'h>>,
) -> Result<String> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            document_content_handlers: document_handlers,
            strict: false,
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;
    // Input is a &str and the rewriter emits UTF-8, so this never substitutes.
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Replace every literal `https://` with `http://`.
pub fn downgrade_links(text: &str) -> String {
    text.replace("https://", "http://")
}

/// Replace each `<noscript>` with its own content.
pub fn unwrap_noscript(html: &str) -> Result<String> {
    rewrite(
        html,
        vec![element!("noscript", |el| {
            el.remove_and_keep_content();
            Ok(())
        })],
    )
}

/// Remove every `<script>` element with its content.
pub fn strip_scripts(html: &str) -> Result<String> {
    rewrite(
        html,
        vec![element!("script", |el| {
            el.remove();
            Ok(())
        })],
    )
}

/// Remove `<style>` and `<link>` elements and every `class`/`style` attribute.
pub fn strip_styles(html: &str) -> Result<String> {
    rewrite(
        html,
        vec![
            element!("style", |el| {
                el.remove();
                Ok(())
            }),
            element!("link", |el| {
                el.remove();
                Ok(())
            }),
            element!("*", |el| {
                el.remove_attribute("class");
                el.remove_attribute("style");
                Ok(())
            }),
        ],
    )
}

/// Output of [`prune_images`].
#[derive(Debug, Default)]
pub struct PrunedDocument {
    pub html: String,
    /// Resolved sources of kept images that declare no usable width.
    pub needs_probe: Vec<Url>,
}

/// Drop SVG images (by resolved source) and inline `<svg>` elements.
pub fn prune_images(html: &str, base: &Url) -> Result<PrunedDocument> {
    let mut needs_probe = Vec::new();
    let html = rewrite(
        html,
        vec![
            element!("img", |el| {
                let Some(src) = resolve(base, el.get_attribute("src")) else {
                    return Ok(());
                };
                if src.as_str().to_ascii_lowercase().ends_with(".svg") {
                    el.remove();
                } else if dimension(el.get_attribute("width")).is_none() {
                    needs_probe.push(src);
                }
                Ok(())
            }),
            element!("svg", |el| {
                el.remove();
                Ok(())
            }),
        ],
    )?;
    Ok(PrunedDocument { html, needs_probe })
}

/// Size images, anchor root-relative links, repair the OAuth `redirect_uri`.
///
/// Image sizing only runs when `max_width` is set. An image without a usable
/// `width` attribute and without a probed size is left untouched.
pub fn repair_document(
    html: &str,
    base: &Url,
    max_width: Option<u32>,
    sizes: &ImageSizeCache,
    policy: &HostPolicyStore,
) -> Result<String> {
    let origin = base.origin().ascii_serialization();
    let mut handlers: Handlers<'_> = Vec::new();

    if let Some(max_width) = max_width {
        handlers.push(element!("img", move |el| {
            let declared = dimension(el.get_attribute("width"));
            let (width, height) = match declared {
                Some(width) => {
                    let height = dimension(el.get_attribute("height"));
                    scale_to(max_width, width, height)
                }
                None => {
                    let Some(size) = resolve(base, el.get_attribute("src"))
                        .and_then(|src| sizes.get(src.as_str()))
                    else {
                        return Ok(());
                    };
                    scale_to(max_width, size.width as f64, Some(size.height as f64))
                }
            };
            el.set_attribute("width", &width.to_string())?;
            if let Some(height) = height {
                el.set_attribute("height", &height.to_string())?;
            }
            Ok(())
        }));
    }

    handlers.push(element!(r#"[href^="/"]"#, |el| {
        if let Some(href) = el.get_attribute("href") {
            el.set_attribute("href", &format!("{}{}", origin, href))?;
        }
        Ok(())
    }));

    handlers.push(element!(r#"input[id="redirect_uri"]"#, |el| {
        let Some(value) = el.get_attribute("value") else {
            return Ok(());
        };
        let Ok(mut redirect_uri) = Url::parse(&value) else {
            return Ok(());
        };
        if redirect_uri
            .host_str()
            .is_some_and(|host| policy.is_force_secure(host))
        {
            // http and https are both special schemes, so this cannot fail
            let _ = redirect_uri.set_scheme("https");
            el.set_attribute("value", redirect_uri.as_str())?;
        }
        Ok(())
    }));

    rewrite(html, handlers)
}

/// Turn serialized `&apos;` entities back into literal apostrophes.
pub fn restore_apostrophes(html: &str) -> String {
    html.replace("&apos;", "'")
}

/// Best-effort minification for hostile hosts.
///
/// Plain comments are dropped while IE conditional comments are kept.
/// Embedded CSS is only minified when stylesheets survived stripping, and
/// then with the same legacy targets as standalone stylesheets. Any failure
/// falls back to the unminified document.
pub fn minify_document(html: &str, strip_css: bool) -> String {
    let prepared = match prepare_for_minify(html, strip_css) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::warn!(error = %e, "HTML minifier pre-pass failed, sending unminified");
            return html.to_string();
        }
    };

    let mut cfg = minify_html::Cfg::default();
    cfg.keep_comments = true;
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.do_not_minify_doctype = true;
    cfg.ensure_spec_compliant_unquoted_attribute_values = true;
    cfg.keep_spaces_between_attributes = true;
    cfg.minify_css = false;
    cfg.minify_js = false;

    match String::from_utf8(minify_html::minify(prepared.as_bytes(), &cfg)) {
        Ok(minified) => minified,
        Err(e) => {
            tracing::warn!(error = %e, "HTML minifier produced invalid output, sending unminified");
            html.to_string()
        }
    }
}

/// Remove plain comments and minify `<style>` contents ahead of `minify_html`.
fn prepare_for_minify(html: &str, strip_css: bool) -> Result<String> {
    let mut handlers: Handlers<'_> = Vec::new();
    if !strip_css {
        let mut stylesheet = String::new();
        handlers.push(text!("style", move |chunk| {
            stylesheet.push_str(chunk.as_str());
            if chunk.last_in_text_node() {
                let minified = css::minify_css_or_original(&stylesheet);
                chunk.replace(&minified, ContentType::Html);
                stylesheet.clear();
            } else {
                chunk.remove();
            }
            Ok(())
        }));
    }

    let comments = doc_comments!(|comment| {
        if !is_conditional_comment(&comment.text()) {
            comment.remove();
        }
        Ok(())
    });

    rewrite_document(html, handlers, vec![comments])
}

/// `<!--[if IE]>...<![endif]-->` and the `<!--<![endif]-->` closer of
/// downlevel-revealed blocks.
fn is_conditional_comment(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("[if") || text.starts_with("<![endif]")
}

fn resolve(base: &Url, src: Option<String>) -> Option<Url> {
    base.join(src?.trim()).ok()
}

/// A positive numeric dimension attribute.
fn dimension(value: Option<String>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Clamp `width` to `max_width`, scaling `height` by the same factor.
fn scale_to(max_width: u32, width: f64, height: Option<f64>) -> (u32, Option<u32>) {
    let new_width = (max_width as f64).min(width);
    let new_height = height.map(|h| (h * new_width / width).round() as u32);
    (new_width.round() as u32, new_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::transform::probe::ImageSize;
    use async_trait::async_trait;

    struct FixedProber(ImageSize);

    #[async_trait]
    impl ImageProber for FixedProber {
        async fn probe(&self, _url: &Url) -> Result<ImageSize> {
            Ok(self.0)
        }
    }

    struct FailingProber;

    #[async_trait]
    impl ImageProber for FailingProber {
        async fn probe(&self, url: &Url) -> Result<ImageSize> {
            Err(ProxyError::ImageProbe {
                url: url.to_string(),
                reason: "unreachable".into(),
            })
        }
    }

    fn base() -> Url {
        Url::parse("http://a.example/dir/page").unwrap()
    }

    fn hostile(max_inline_width: Option<u32>) -> HtmlOptions {
        HtmlOptions {
            trust: Trust::Hostile,
            strip_js: true,
            strip_css: true,
            max_inline_width,
        }
    }

    #[test]
    fn test_downgrade_is_idempotent() {
        let once = downgrade_links(r#"<a href="https://x.example/">https://y</a>"#);
        assert!(!once.contains("https://"));
        assert_eq!(downgrade_links(&once), once);
    }

    #[test]
    fn test_noscript_unwrapped_before_script_removal() {
        let html = "<p>a</p><script>evil()</script><noscript><b>no js</b></noscript>";
        let out = strip_scripts(&unwrap_noscript(html).unwrap()).unwrap();
        assert!(!out.contains("<script"));
        assert!(!out.contains("noscript"));
        assert!(out.contains("<b>no js</b>"));
        assert!(out.contains("<p>a</p>"));
    }

    #[test]
    fn test_strip_styles() {
        let html = r#"<head><style>p{}</style><link rel="stylesheet" href="/s.css"></head><p class="x" style="color:red" id="k">t</p>"#;
        let out = strip_styles(html).unwrap();
        assert!(!out.contains("<style"));
        assert!(!out.contains("<link"));
        assert!(!out.contains("class="));
        assert!(!out.contains("style="));
        assert!(out.contains(r#"id="k""#));
    }

    #[test]
    fn test_prune_images() {
        let html = r#"<img src="logo.SVG"><img src="/a.png"><img src="b.png" width="50"><svg><circle/></svg>"#;
        let pruned = prune_images(html, &base()).unwrap();
        assert!(!pruned.html.contains("logo"));
        assert!(!pruned.html.contains("<svg"));
        assert!(pruned.html.contains(r#"src="/a.png""#));
        assert!(pruned.html.contains(r#"src="b.png""#));
        assert_eq!(pruned.needs_probe, vec![Url::parse("http://a.example/a.png").unwrap()]);
    }

    #[test]
    fn test_declared_width_is_scaled() {
        let html = r#"<img src="a.png" width="400" height="300">"#;
        let out = repair_document(html, &base(), Some(100), &ImageSizeCache::default(), &HostPolicyStore::new()).unwrap();
        assert!(out.contains(r#"width="100""#));
        assert!(out.contains(r#"height="75""#));
    }

    #[test]
    fn test_small_declared_width_kept() {
        let html = r#"<img src="a.png" width="40" height="30">"#;
        let out = repair_document(html, &base(), Some(100), &ImageSizeCache::default(), &HostPolicyStore::new()).unwrap();
        assert!(out.contains(r#"width="40""#));
        assert!(out.contains(r#"height="30""#));
    }

    #[test]
    fn test_probed_size_is_scaled() {
        let mut sizes = ImageSizeCache::default();
        sizes.insert("http://a.example/dir/a.png", ImageSize { width: 800, height: 600 });
        let html = r#"<img src="a.png"><img src="missing.png">"#;
        let out = repair_document(html, &base(), Some(200), &sizes, &HostPolicyStore::new()).unwrap();
        assert!(out.contains(r#"<img src="a.png" width="200" height="150">"#));
        assert!(out.contains(r#"<img src="missing.png">"#));
    }

    #[test]
    fn test_root_relative_href() {
        let html = r#"<a href="/next">n</a><a href="rel">r</a><a href="http://b.example/">b</a>"#;
        let base = Url::parse("http://a.example:8080/dir/page").unwrap();
        let out = repair_document(html, &base, None, &ImageSizeCache::default(), &HostPolicyStore::new()).unwrap();
        assert!(out.contains(r#"href="http://a.example:8080/next""#));
        assert!(out.contains(r#"href="rel""#));
        assert!(out.contains(r#"href="http://b.example/""#));
    }

    #[test]
    fn test_redirect_uri_repaired_for_force_secure_host() {
        let policy = HostPolicyStore::new();
        policy.mark_force_secure("login.example");
        let html = r#"<input id="redirect_uri" value="http://login.example/cb"><input id="other" value="http://login.example/cb">"#;
        let out = repair_document(html, &base(), None, &ImageSizeCache::default(), &policy).unwrap();
        assert!(out.contains(r#"<input id="redirect_uri" value="https://login.example/cb">"#));
        assert!(out.contains(r#"<input id="other" value="http://login.example/cb">"#));

        let untouched = repair_document(html, &base(), None, &ImageSizeCache::default(), &HostPolicyStore::new()).unwrap();
        assert!(!untouched.contains("https://"));
    }

    #[test]
    fn test_restore_apostrophes() {
        assert_eq!(restore_apostrophes("it&apos;s"), "it's");
    }

    #[tokio::test]
    async fn test_friendly_document_untouched_except_downgrade() {
        let html = r#"<html><head><style>p { color: red; }</style></head><body><script>x()</script><img src="/i.svg"><p class="c">https://a.example/</p></body></html>"#;
        let options = HtmlOptions {
            trust: Trust::Friendly,
            ..hostile(Some(100))
        };
        let out = transform_html(html, &base(), &options, &HostPolicyStore::new(), &FailingProber)
            .await
            .unwrap();
        assert_eq!(out, html.replace("https://", "http://"));
        assert!(out.contains("<script>x()</script>"));
        assert!(out.contains("<style>"));
        assert!(out.contains("<img"));
    }

    #[tokio::test]
    async fn test_hostile_document_stripped_sized_and_minified() {
        let html = "<html>\n  <body>\n    <script>x</script>\n    <img src=\"/i.png\">\n  </body>\n</html>\n";
        let out = transform_html(
            html,
            &base(),
            &hostile(Some(100)),
            &HostPolicyStore::new(),
            &FixedProber(ImageSize { width: 400, height: 200 }),
        )
        .await
        .unwrap();
        assert!(!out.contains("<script"));
        assert!(out.contains("<img"));
        assert!(out.contains("width=100") || out.contains(r#"width="100""#));
        assert!(out.contains("height=50") || out.contains(r#"height="50""#));
        assert!(!out.contains("\n    "));
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_fatal() {
        let html = r#"<p>t</p><img src="/a.png">"#;
        let out = transform_html(html, &base(), &hostile(Some(100)), &HostPolicyStore::new(), &FailingProber)
            .await
            .unwrap();
        assert!(out.contains("<img"));
        assert!(!out.contains("width"));
    }

    #[test]
    fn test_minify_keeps_conditional_comments() {
        let html = "<html><head><!--[if lt IE 9]><p>old ie</p><![endif]--><!-- plain --></head><body><p>x</p></body></html>";
        let out = minify_document(html, true);
        assert!(out.contains("<!--[if lt IE 9]>"), "{}", out);
        assert!(out.contains("old ie"), "{}", out);
        assert!(out.contains("<![endif]-->"), "{}", out);
        assert!(!out.contains("plain"), "{}", out);
    }

    #[test]
    fn test_minify_keeps_downlevel_revealed_markers() {
        let html = "<body><!--[if !IE]><!--><p>modern</p><!--<![endif]--><!-- note --></body>";
        let out = minify_document(html, true);
        assert!(out.contains("<!--[if !IE]>"), "{}", out);
        assert!(out.contains("<!--<![endif]-->"), "{}", out);
        assert!(!out.contains("note"), "{}", out);
    }

    #[test]
    fn test_minify_collapses_boolean_attributes_and_whitespace() {
        let html = "<body>\n  <form>\n    <input type=\"checkbox\" checked=\"checked\">\n  </form>\n</body>";
        let out = minify_document(html, true);
        assert!(out.contains("checked"), "{}", out);
        assert!(!out.contains(r#"checked="checked""#), "{}", out);
        assert!(!out.contains("\n  "), "{}", out);
    }

    #[test]
    fn test_minify_embedded_css_with_legacy_targets() {
        let html = "<html><head><style>\np {\n  color: rgba(255, 0, 0, 0.5);\n}\n</style></head><body></body></html>";
        let out = minify_document(html, false);
        assert!(out.contains("rgba("), "{}", out);
        assert!(!out.contains("#ff000080"), "{}", out);
        assert!(out.contains("<style>p{"), "{}", out);
    }

    #[test]
    fn test_minify_leaves_embedded_css_when_css_stripped() {
        let html = "<html><head><style>p {  color:  red; }</style></head><body></body></html>";
        let out = minify_document(html, true);
        assert!(out.contains("<style>p {  color:  red; }</style>"), "{}", out);
    }

    #[test]
    fn test_scale_to() {
        assert_eq!(scale_to(100, 400.0, Some(300.0)), (100, Some(75)));
        assert_eq!(scale_to(100, 50.0, Some(20.0)), (50, Some(20)));
        assert_eq!(scale_to(100, 300.0, None), (100, None));
    }
}
