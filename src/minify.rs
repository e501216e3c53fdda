//! Production-mode output post-processing. A [`PostProcess`] implementation
//! takes finished output bytes and returns transformed bytes; the build
//! orchestrator applies the configured processors only when building in
//! production mode. [`HtmlMinifier`] is the stock implementation: it strips
//! HTML comments and collapses runs of whitespace, leaving `<pre>` regions
//! untouched.

/// Transforms finished output bytes. Implementations must be infallible; a
/// processor that can't handle its input should return it unchanged.
pub trait PostProcess {
    fn process(&self, output: Vec<u8>) -> Vec<u8>;
}

/// A conservative HTML minifier.
pub struct HtmlMinifier {
    /// Remove `<!-- ... -->` comments.
    pub remove_comments: bool,

    /// Collapse runs of whitespace into a single space.
    pub remove_multi_spaces: bool,
}

impl Default for HtmlMinifier {
    fn default() -> HtmlMinifier {
        HtmlMinifier {
            remove_comments: true,
            remove_multi_spaces: true,
        }
    }
}

impl PostProcess for HtmlMinifier {
    /// Minifies HTML text. Non-UTF-8 input passes through untouched, as do
    /// `<pre>` regions, where whitespace is significant.
    fn process(&self, output: Vec<u8>) -> Vec<u8> {
        let input = match String::from_utf8(output) {
            Ok(input) => input,
            Err(err) => return err.into_bytes(),
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_str();
        while let Some(start) = find_pre_start(rest) {
            let (head, tail) = rest.split_at(start);
            self.minify_fragment(head, &mut out);
            match tail.find("</pre>") {
                None => {
                    out.push_str(tail);
                    rest = "";
                    break;
                }
                Some(stop) => {
                    let stop = stop + "</pre>".len();
                    out.push_str(&tail[..stop]);
                    rest = &tail[stop..];
                }
            }
        }
        self.minify_fragment(rest, &mut out);
        out.into_bytes()
    }
}

// Finds the next opening `<pre>` tag, including ones carrying attributes
// (`<pre class=...>`). A longer tag name that merely starts with `pre` is
// not a preformatted region.
fn find_pre_start(fragment: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(at) = fragment[from..].find("<pre") {
        let start = from + at;
        let after = &fragment[start + "<pre".len()..];
        match after.chars().next() {
            None | Some('>') => return Some(start),
            Some(c) if c.is_whitespace() => return Some(start),
            Some(_) => from = start + "<pre".len(),
        }
    }
    None
}

impl HtmlMinifier {
    fn minify_fragment(&self, mut fragment: &str, out: &mut String) {
        if self.remove_comments {
            let mut stripped = String::with_capacity(fragment.len());
            while let Some(start) = fragment.find("<!--") {
                stripped.push_str(&fragment[..start]);
                match fragment[start..].find("-->") {
                    // An unterminated comment swallows the rest of the
                    // fragment, same as a browser would.
                    None => {
                        fragment = "";
                        break;
                    }
                    Some(stop) => fragment = &fragment[start + stop + "-->".len()..],
                }
            }
            stripped.push_str(fragment);
            self.collapse(&stripped, out);
        } else {
            self.collapse(fragment, out);
        }
    }

    fn collapse(&self, fragment: &str, out: &mut String) {
        if !self.remove_multi_spaces {
            out.push_str(fragment);
            return;
        }
        let mut in_whitespace = false;
        for c in fragment.chars() {
            if c.is_whitespace() {
                if !in_whitespace {
                    out.push(' ');
                }
                in_whitespace = true;
            } else {
                out.push(c);
                in_whitespace = false;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn minify(input: &str) -> String {
        let minified = HtmlMinifier::default().process(input.as_bytes().to_vec());
        String::from_utf8(minified).unwrap()
    }

    #[test]
    fn test_removes_comments() {
        assert_eq!("<p>a</p><p>b</p>", minify("<p>a</p><!-- note --><p>b</p>"));
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!("<p> a b </p>", minify("<p>\n  a\t\tb\n</p>"));
    }

    #[test]
    fn test_preserves_pre_regions() {
        let input = "<div>  x  </div><pre>  keep\n\tthis  </pre><div>  y  </div>";
        assert_eq!(
            "<div> x </div><pre>  keep\n\tthis  </pre><div> y </div>",
            minify(input),
        );
    }

    #[test]
    fn test_preserves_pre_with_attributes() {
        let input = "<pre class=\"code\">  a  b  </pre>";
        assert_eq!(input, minify(input));
    }

    #[test]
    fn test_pre_prefixed_tags_still_minified() {
        assert_eq!(
            "<presentation> a b </presentation>",
            minify("<presentation>  a\n\tb  </presentation>"),
        );
    }

    #[test]
    fn test_comment_inside_pre_survives() {
        let input = "<pre><!-- not a comment to strip --></pre>";
        assert_eq!(input, minify(input));
    }

    #[test]
    fn test_disabled_minifier_is_identity() {
        let minifier = HtmlMinifier {
            remove_comments: false,
            remove_multi_spaces: false,
        };
        let input = "<p>  a  <!-- keep --></p>";
        assert_eq!(
            input.as_bytes().to_vec(),
            minifier.process(input.as_bytes().to_vec()),
        );
    }
}
