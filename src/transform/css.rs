//! Stylesheet minification.
//!
//! Output targets very old browsers: modern syntax (alpha colors, `rem`,
//! viewport units, merged shorthands) is never introduced by the minifier.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::error::{ProxyError, Result};

/// Browser floor used for every minification.
fn legacy_targets() -> Targets {
    Targets::from(Browsers {
        ie: Some(6 << 16),
        firefox: Some(2 << 16),
        safari: Some(3 << 16),
        opera: Some(9 << 16),
        ..Browsers::default()
    })
}

/// Minify `text`, recovering from rules the parser does not understand.
pub fn minify_css(text: &str) -> Result<String> {
    let mut sheet = StyleSheet::parse(
        text,
        ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        },
    )
    .map_err(|e| ProxyError::MinifyParse(e.to_string()))?;

    sheet
        .minify(MinifyOptions {
            targets: legacy_targets(),
            ..MinifyOptions::default()
        })
        .map_err(|e| ProxyError::MinifyParse(e.to_string()))?;

    let output = sheet
        .to_css(PrinterOptions {
            minify: true,
            targets: legacy_targets(),
            ..PrinterOptions::default()
        })
        .map_err(|e| ProxyError::MinifyParse(e.to_string()))?;
    Ok(output.code)
}

/// Minify, or hand back the original text if the minifier gives up.
pub fn minify_css_or_original(text: &str) -> String {
    match minify_css(text) {
        Ok(minified) => minified,
        Err(e) => {
            tracing::warn!(error = %e, "CSS minifier failed, sending original stylesheet");
            text.to_string()
        }
    }
}
