use log::debug;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Fixed significance level for calling positive selection.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Statistics for one classified accession.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub accession: String,
    pub p_value: f64,
    pub lnl_alt: f64,
    pub np_alt: u32,
    pub lnl_null: f64,
    pub np_null: u32,
}

impl SelectionResult {
    pub fn positively_selected(&self) -> bool {
        self.p_value <= SIGNIFICANCE_LEVEL
    }
}

// --------------------------------------------------
/// Compare the alternative and null model fits: the statistic is
/// 2(lnL_alt - lnL_null), chi-squared distributed with np_alt - np_null
/// degrees of freedom, and the p-value is its upper-tail probability.
///
/// Returns `None` when the degrees of freedom are not positive. The
/// survival function is degenerate there, so such accessions go to the
/// rerun list instead of getting a nonsense p-value.
pub fn test(
    accession: &str,
    alt: (f64, u32),
    null: (f64, u32),
) -> Option<SelectionResult> {
    let (lnl_alt, np_alt) = alt;
    let (lnl_null, np_null) = null;

    let delta = 2.0 * (lnl_alt - lnl_null);
    let df = i64::from(np_alt) - i64::from(np_null);
    debug!("{accession}: delta = {delta}, df = {df}");

    if df <= 0 {
        return None;
    }

    let chisq = ChiSquared::new(df as f64).ok()?;
    let p_value = if delta <= 0.0 {
        1.0
    } else {
        (1.0 - chisq.cdf(delta)).clamp(0.0, 1.0)
    };

    Some(SelectionResult {
        accession: accession.to_string(),
        p_value,
        lnl_alt,
        np_alt,
        lnl_null,
        np_null,
    })
}

// --------------------------------------------------
#[cfg(test)]
mod tests {
    use super::{test, SIGNIFICANCE_LEVEL};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detects_positive_selection() {
        // delta = 10, df = 1 => p ~ 0.00157
        let res = test("QJT20307.1", (-1000.0, 3), (-1005.0, 2));
        assert!(res.is_some());

        let res = res.unwrap();
        assert!((res.p_value - 0.0015654).abs() < 1e-5);
        assert!(res.positively_selected());
        assert_eq!(res.lnl_alt, -1000.0);
        assert_eq!(res.np_null, 2);
    }

    #[test]
    fn test_no_selection_when_models_tie() {
        // delta = 0.2, df = 1 => p ~ 0.65
        let res = test("QKY51244.1", (-1004.9, 3), (-1005.0, 2)).unwrap();
        assert!(res.p_value > SIGNIFICANCE_LEVEL);
        assert!(!res.positively_selected());
    }

    #[test]
    fn test_negative_statistic_is_never_significant() {
        let res = test("QKY51244.1", (-1010.0, 3), (-1005.0, 2)).unwrap();
        assert_eq!(res.p_value, 1.0);
        assert!(!res.positively_selected());
    }

    #[test]
    fn test_degenerate_degrees_of_freedom() {
        assert!(test("AUZ40945.1", (-1000.0, 2), (-1005.0, 2)).is_none());
        assert!(test("AUZ40945.1", (-1000.0, 1), (-1005.0, 2)).is_none());
    }

    #[test]
    fn test_p_value_stays_in_unit_interval() {
        for (lnl_alt, np_alt) in
            [(-1004.999, 3), (-900.0, 5), (-1005.0, 4), (-2000.0, 3)]
        {
            let res = test("X", (lnl_alt, np_alt), (-1005.0, 2)).unwrap();
            assert!((0.0..=1.0).contains(&res.p_value));
        }
    }
}
