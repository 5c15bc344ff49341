use super::{call, method, Dialect, Operand, Printed, PrinterRegistry};

const D: Dialect = Dialect::Pandas;

/// `x.rolling(d).<reduce>(extra)`
fn rolling(x: &Operand, window: &Operand, reduce: &str, extra: &[&str]) -> Printed {
    let window = method(x, "rolling", &[&window.text]);
    Printed::atom(format!("{}.{reduce}({})", window.text, extra.join(", ")))
}

pub(super) fn register(registry: &mut PrinterRegistry) {
    registry
        .register("abs", D, 1, |a| {
            if a[0].is_literal() {
                call("np.abs", &[&a[0].text])
            } else {
                method(&a[0], "abs", &[])
            }
        })
        .register("log", D, 1, |a| call("np.log", &[&a[0].text]))
        .register("sign", D, 1, |a| call("np.sign", &[&a[0].text]))
        .register("max", D, 2, |a| call("np.maximum", &[&a[0].text, &a[1].text]))
        .register("min", D, 2, |a| call("np.minimum", &[&a[0].text, &a[1].text]))
        .register("if_else", D, 3, |a| {
            call("np.where", &[&a[0].text, &a[1].text, &a[2].text])
        })
        .register("ts_mean", D, 2, |a| rolling(&a[0], &a[1], "mean", &[]))
        .register("ts_sum", D, 2, |a| rolling(&a[0], &a[1], "sum", &[]))
        .register("ts_max", D, 2, |a| rolling(&a[0], &a[1], "max", &[]))
        .register("ts_min", D, 2, |a| rolling(&a[0], &a[1], "min", &[]))
        .register("ts_std_dev", D, 2, |a| rolling(&a[0], &a[1], "std", &["ddof=0"]))
        .register("ts_delta", D, 2, |a| method(&a[0], "diff", &[&a[1].text]))
        .register("ts_delay", D, 2, |a| method(&a[0], "shift", &[&a[1].text]))
        .register("ts_product", D, 2, |a| {
            rolling(&a[0], &a[1], "apply", &["np.prod", "raw=True"])
        })
        .register("ts_rank", D, 2, |a| rolling(&a[0], &a[1], "rank", &["pct=True"]))
        .register("ts_corr", D, 3, |a| rolling(&a[0], &a[2], "corr", &[&a[1].text]))
        .register("ts_covariance", D, 3, |a| {
            rolling(&a[0], &a[2], "cov", &[&a[1].text, "ddof=0"])
        })
        .register("cs_rank", D, 1, |a| method(&a[0], "rank", &["pct=True"]))
        .register("gp_rank", D, 2, |a| method(&a[1], "rank", &["pct=True"]));
}
