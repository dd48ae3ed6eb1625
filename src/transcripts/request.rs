use super::SearchError;

/// Row limit applied when the caller does not ask for more.
pub const DEFAULT_RESULT_LIMIT: u32 = 10;

/// A validated transcript search. Built once per invocation, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    terms: Vec<String>,
    days_back: u32,
    preferred_region: String,
    result_limit: u32,
}

impl SearchRequest {
    /// Rows match when their transcript contains any of `terms` (case-insensitive).
    pub fn new<I, T>(terms: I, days_back: i64, preferred_region: &str) -> Result<Self, SearchError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        if terms.is_empty() || terms.iter().any(|t| t.trim().is_empty()) {
            return Err(SearchError::EmptyTerm);
        }
        let days_back = u32::try_from(days_back).map_err(|_| SearchError::InvalidDaysBack(days_back))?;
        let preferred_region = preferred_region.trim();
        if preferred_region.is_empty() {
            return Err(SearchError::EmptyRegion);
        }
        Ok(Self {
            terms,
            days_back,
            preferred_region: preferred_region.to_string(),
            result_limit: DEFAULT_RESULT_LIMIT,
        })
    }

    pub fn with_limit(self, result_limit: u32) -> Result<Self, SearchError> {
        if result_limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        Ok(Self {
            result_limit,
            ..self
        })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn days_back(&self) -> u32 {
        self.days_back
    }

    pub fn preferred_region(&self) -> &str {
        &self.preferred_region
    }

    pub fn result_limit(&self) -> u32 {
        self.result_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_default_limit() {
        let req = SearchRequest::new(["BigCommerce"], 30, "US").unwrap();
        assert_eq!(req.terms(), ["BigCommerce"]);
        assert_eq!(req.days_back(), 30);
        assert_eq!(req.preferred_region(), "US");
        assert_eq!(req.result_limit(), DEFAULT_RESULT_LIMIT);
    }

    #[test]
    fn zero_days_is_valid() {
        assert_eq!(SearchRequest::new(["x"], 0, "US").unwrap().days_back(), 0);
    }

    #[test]
    fn negative_days_rejected() {
        let err = SearchRequest::new(["x"], -1, "US").unwrap_err();
        assert!(matches!(err, SearchError::InvalidDaysBack(-1)));
    }

    #[test]
    fn blank_terms_rejected() {
        assert!(matches!(
            SearchRequest::new(Vec::<String>::new(), 1, "US"),
            Err(SearchError::EmptyTerm)
        ));
        assert!(matches!(
            SearchRequest::new(["ok", "  "], 1, "US"),
            Err(SearchError::EmptyTerm)
        ));
    }

    #[test]
    fn blank_region_rejected() {
        assert!(matches!(
            SearchRequest::new(["x"], 1, " "),
            Err(SearchError::EmptyRegion)
        ));
    }

    #[test]
    fn zero_limit_rejected() {
        let req = SearchRequest::new(["x"], 1, "EU").unwrap();
        assert!(matches!(req.clone().with_limit(0), Err(SearchError::InvalidLimit)));
        assert_eq!(req.with_limit(100).unwrap().result_limit(), 100);
    }
}
