//! Log-domain helpers for the likelihood models.

/// Natural logs of 0..=10. Genotype arithmetic needs `ln n` for multiplicity
/// weights and the ploidy penalty; common ploidies never leave this table.
const LN_TABLE: [f64; 11] = [
    f64::NEG_INFINITY,
    0.0,
    0.693_147_180_559_945_3,
    1.098_612_288_668_109_7,
    1.386_294_361_119_890_6,
    1.609_437_912_434_100_4,
    1.791_759_469_228_055,
    1.945_910_149_055_313_3,
    2.079_441_541_679_835_7,
    2.197_224_577_336_219_6,
    2.302_585_092_994_046,
];

/// `ln n`, table-backed for n <= 10.
pub fn ln_int(n: usize) -> f64 {
    match LN_TABLE.get(n) {
        Some(&value) => value,
        None => (n as f64).ln(),
    }
}

/// Numerically stable `ln(exp(a) + exp(b))`.
pub fn log_sum_exp2(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max.is_infinite() {
        return max;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Numerically stable `ln(exp(a) + exp(b) + exp(c))`.
pub fn log_sum_exp3(a: f64, b: f64, c: f64) -> f64 {
    let max = a.max(b).max(c);
    if max.is_infinite() {
        return max;
    }
    max + ((a - max).exp() + (b - max).exp() + (c - max).exp()).ln()
}

/// Numerically stable `ln Σ exp(x)` over a slice via the max-shift form.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|&x| (x - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0), "{a} != {b}");
    }

    #[test]
    fn table_matches_runtime_logs() {
        for n in 1..=10 {
            close(ln_int(n), (n as f64).ln());
        }
        close(ln_int(11), 11f64.ln());
        assert!(ln_int(0).is_infinite());
    }

    #[test]
    fn log_sum_exp_agrees_with_naive_form() {
        let values = [-1.0, -2.5, -0.3];
        let naive = values.iter().map(|x: &f64| x.exp()).sum::<f64>().ln();
        close(log_sum_exp(&values), naive);
        close(log_sum_exp2(values[0], values[1]), (values[0].exp() + values[1].exp()).ln());
        close(
            log_sum_exp3(values[0], values[1], values[2]),
            naive,
        );
    }

    #[test]
    fn survives_extreme_magnitudes() {
        // the naive form underflows to ln(0) here; max-shift must not
        let result = log_sum_exp2(-1000.0, -1001.0);
        close(result, -1000.0 + (1.0 + (-1.0f64).exp()).ln());

        assert!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]).is_infinite());
        close(log_sum_exp2(f64::NEG_INFINITY, -2.0), -2.0);
    }

    #[test]
    fn empty_slice_is_log_zero() {
        assert!(log_sum_exp(&[]).is_infinite());
        assert!(log_sum_exp(&[]) < 0.0);
    }
}
