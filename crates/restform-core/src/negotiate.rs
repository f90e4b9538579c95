//! `Accept` header parsing and best-match content negotiation.

use std::fmt;

/// One entry of an `Accept` header, e.g. `text/*;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    type_: String,
    subtype: String,
    quality: f32,
}

impl MediaRange {
    /// Parse a single media range. Returns `None` for malformed entries.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        // Some clients send a bare `*`.
        if raw == "*" {
            return Some(Self::any());
        }
        let parsed: mime::Mime = raw.parse().ok()?;
        let quality = parsed
            .get_param("q")
            .and_then(|q| q.as_str().parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        // `mime` splits `vnd.collection+json` into subtype and suffix.
        let subtype = match parsed.suffix() {
            Some(suffix) => format!("{}+{}", parsed.subtype(), suffix),
            None => parsed.subtype().to_string(),
        };
        Some(Self {
            type_: parsed.type_().as_str().to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            quality,
        })
    }

    /// `*/*`
    pub fn any() -> Self {
        Self {
            type_: "*".to_string(),
            subtype: "*".to_string(),
            quality: 1.0,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// 0 for `*/*`, 1 for `type/*`, 2 for a concrete type.
    pub fn specificity(&self) -> u8 {
        match (self.type_.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    /// Whether this range covers the offered media type.
    pub fn matches(&self, offer: &str) -> bool {
        let Some((offer_type, offer_subtype)) = split_essence(offer) else {
            return false;
        };
        (self.type_ == "*" || self.type_ == offer_type)
            && (self.subtype == "*" || self.subtype == offer_subtype)
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        if self.quality < 1.0 {
            write!(f, ";q={}", self.quality)?;
        }
        Ok(())
    }
}

/// Lowercased `(type, subtype)` of an offered media type, ignoring parameters.
fn split_essence(offer: &str) -> Option<(String, String)> {
    let essence = offer.split(';').next()?.trim().to_ascii_lowercase();
    let (type_, subtype) = essence.split_once('/')?;
    Some((type_.to_string(), subtype.to_string()))
}

/// The client's ranked content-type preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptPreferences {
    ranges: Vec<MediaRange>,
}

impl Default for AcceptPreferences {
    fn default() -> Self {
        Self::any()
    }
}

impl AcceptPreferences {
    /// Accept anything, which is what a missing `Accept` header means.
    pub fn any() -> Self {
        Self {
            ranges: vec![MediaRange::any()],
        }
    }

    /// Parse an `Accept` header value. Malformed entries are skipped; a blank
    /// header is treated as `*/*`.
    pub fn parse(header: &str) -> Self {
        if header.trim().is_empty() {
            return Self::any();
        }
        let ranges = header
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .filter_map(|part| {
                let range = MediaRange::parse(part);
                if range.is_none() {
                    tracing::debug!(entry = part.trim(), "skipping malformed Accept entry");
                }
                range
            })
            .collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[MediaRange] {
        &self.ranges
    }

    /// Quality and specificity of the most specific range matching `offer`.
    fn rank(&self, offer: &str) -> Option<(f32, u8)> {
        self.ranges
            .iter()
            .filter(|range| range.matches(offer))
            .max_by_key(|range| range.specificity())
            .map(|range| (range.quality, range.specificity()))
    }

    /// Pick the best offer.
    ///
    /// The highest quality wins; on equal quality the offer matched by the more
    /// specific range wins; remaining ties go to the earlier offer. An offer
    /// whose most specific matching range has `q=0` is never chosen.
    pub fn best_match<'a, I>(&self, offers: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f32, u8)> = None;
        for offer in offers {
            let Some((quality, specificity)) = self.rank(offer) else {
                continue;
            };
            if quality <= 0.0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, best_quality, best_specificity)) => {
                    quality > best_quality
                        || (quality == best_quality && specificity > best_specificity)
                }
            };
            if better {
                best = Some((offer, quality, specificity));
            }
        }
        best.map(|(offer, _, _)| offer)
    }
}

impl fmt::Display for AcceptPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, range) in self.ranges.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}
