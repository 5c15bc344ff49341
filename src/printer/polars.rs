use super::{call, method, Dialect, Operand, Printed, PrinterRegistry};

const D: Dialect = Dialect::Polars;

/// numpy on a bare literal, the expression method otherwise.
fn literal_aware(x: &Operand, np_func: &str, expr_method: &str) -> Printed {
    if x.is_literal() {
        call(np_func, &[&x.text])
    } else {
        method(x, expr_method, &[])
    }
}

fn rolling(x: &Operand, name: &str, window: &Operand) -> Printed {
    method(x, name, &[&window.text])
}

pub(super) fn register(registry: &mut PrinterRegistry) {
    registry
        .register("abs", D, 1, |a| literal_aware(&a[0], "np.abs", "abs"))
        .register("log", D, 1, |a| literal_aware(&a[0], "np.log", "log"))
        .register("sign", D, 1, |a| literal_aware(&a[0], "np.sign", "sign"))
        .register("max", D, 2, |a| {
            Printed::atom(format!("pl.max_horizontal([{}, {}])", a[0].text, a[1].text))
        })
        .register("min", D, 2, |a| {
            Printed::atom(format!("pl.min_horizontal([{}, {}])", a[0].text, a[1].text))
        })
        .register("if_else", D, 3, |a| {
            Printed::atom(format!(
                "pl.when({}).then({}).otherwise({})",
                a[0].text, a[1].text, a[2].text
            ))
        })
        .register("ts_mean", D, 2, |a| rolling(&a[0], "rolling_mean", &a[1]))
        .register("ts_sum", D, 2, |a| rolling(&a[0], "rolling_sum", &a[1]))
        .register("ts_max", D, 2, |a| rolling(&a[0], "rolling_max", &a[1]))
        .register("ts_min", D, 2, |a| rolling(&a[0], "rolling_min", &a[1]))
        .register("ts_std_dev", D, 2, |a| {
            method(&a[0], "rolling_std", &[&a[1].text, "ddof=0"])
        })
        .register("ts_delta", D, 2, |a| rolling(&a[0], "diff", &a[1]))
        .register("ts_delay", D, 2, |a| rolling(&a[0], "shift", &a[1]))
        .register("ts_product", D, 2, |a| {
            method(&a[0], "rolling_map", &["np.prod", &a[1].text])
        })
        .register("ts_rank", D, 2, |a| {
            call("_rolling_rank", &[&a[0].text, &a[1].text])
        })
        .register("ts_corr", D, 3, |a| {
            let window = format!("window_size={}", a[2].text);
            call("pl.rolling_corr", &[&a[0].text, &a[1].text, &window, "ddof=0"])
        })
        .register("ts_covariance", D, 3, |a| {
            let window = format!("window_size={}", a[2].text);
            call("pl.rolling_cov", &[&a[0].text, &a[1].text, &window, "ddof=0"])
        })
        .register("cs_rank", D, 1, |a| call("_rank_pct", &[&a[0].text]))
        .register("gp_rank", D, 2, |a| call("_rank_pct", &[&a[1].text]));
}
