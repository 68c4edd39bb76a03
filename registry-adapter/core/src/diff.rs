use crate::model::Instance;

/// Returns the instances in `a` that have no matching instance in `b`,
/// where "matching" is the `(host, port, protocol)` identity `Instance`
/// already uses for equality. Mirrors the original registry client's
/// `subtract`/`contain` pair, used by the reconciliation loop to compute
/// which instances were added or removed between two fetches.
pub fn subtract(a: &[Instance], b: &[Instance]) -> Vec<Instance> {
    a.iter().filter(|inst| !b.contains(inst)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Port;

    fn inst(host: &str, port: &str) -> Instance {
        Instance::new(host, Port::new("TCP", port), "svc".to_string())
    }

    #[test]
    fn subtract_removes_common_instances() {
        let a = vec![inst("10.0.0.1", "80"), inst("10.0.0.2", "80")];
        let b = vec![inst("10.0.0.1", "80")];
        let result = subtract(&a, &b);
        assert_eq!(result, vec![inst("10.0.0.2", "80")]);
    }

    #[test]
    fn subtract_ignores_label_differences() {
        let mut a_inst = inst("10.0.0.1", "80");
        a_inst.labels.insert("k".into(), "v".into());
        let a = vec![a_inst];
        let b = vec![inst("10.0.0.1", "80")];
        assert!(subtract(&a, &b).is_empty());
    }

    #[test]
    fn subtract_empty_b_returns_all_of_a() {
        let a = vec![inst("10.0.0.1", "80"), inst("10.0.0.2", "80")];
        assert_eq!(subtract(&a, &[]), a);
    }
}
