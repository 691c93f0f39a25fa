//! Credit charge and refund arithmetic.
//!
//! Submission charges one credit per requested variation up front. When
//! the batch settles (reaches a terminal aggregate status), the shortfall
//! — credits charged for variations that never produced output — is
//! refunded. Issuing the refund at most once is the repository layer's
//! job (`refund_issued` guard); this module only computes amounts.

/// Credits charged per requested variation.
pub const CREDITS_PER_VARIATION: i64 = 1;

/// Credits to charge for a submission of `requested` variations.
pub fn charge_amount(requested: i64) -> i64 {
    requested * CREDITS_PER_VARIATION
}

/// Refund owed when a batch settles.
///
/// `charged` is the amount deducted at submission; `produced_output` is
/// the number of variations that reached `COMPLETED` (including degraded
/// completions — the generation itself succeeded, so they are not
/// refunded).
pub fn refund_amount(charged: i64, produced_output: i64) -> i64 {
    (charged - produced_output * CREDITS_PER_VARIATION).max(0)
}

/// Refund still owed given what has already been refunded.
///
/// A batch settles again after being extended; earlier settlements'
/// refunds must not be paid twice.
pub fn outstanding_refund(charged: i64, produced_output: i64, already_refunded: i64) -> i64 {
    (refund_amount(charged, produced_output) - already_refunded).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_success_refunds_nothing() {
        assert_eq!(refund_amount(charge_amount(4), 4), 0);
    }

    #[test]
    fn partial_failure_refunds_shortfall() {
        // Charged for 3, one completed out of three: refund exactly 2.
        assert_eq!(refund_amount(charge_amount(3), 1), 2);
    }

    #[test]
    fn one_submission_failure_out_of_two_refunds_one() {
        // Scenario B: 2 requested, 1 succeeds end-to-end.
        assert_eq!(refund_amount(charge_amount(2), 1), 1);
    }

    #[test]
    fn total_failure_refunds_everything() {
        assert_eq!(refund_amount(charge_amount(5), 0), 5);
    }

    #[test]
    fn extended_batch_settles_only_the_new_shortfall() {
        // First lifecycle: charged 2, 1 completed, 1 refunded. Extended
        // by 2 more (charged now 4); 1 of the new pair completes. Total
        // shortfall is 2, of which 1 was already paid.
        assert_eq!(outstanding_refund(4, 2, 1), 1);
        // Nothing new owed: second settlement is a no-op.
        assert_eq!(outstanding_refund(4, 3, 1), 0);
    }

    #[test]
    fn refund_never_goes_negative() {
        // More completions than charged units would indicate a bookkeeping
        // bug elsewhere; the refund still clamps at zero.
        assert_eq!(refund_amount(2, 5), 0);
    }
}
