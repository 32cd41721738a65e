use kurant::algebra::{mul, sin};
use kurant::primitives::parameter;
use kurant::{traverse_tree, tree_report, CoeffRef, CoefficientFunction};

#[test]
fn traversal_is_post_order() {
    let p = parameter(0.5);
    let p_cf: CoeffRef = p.clone();
    let expr = mul(sin(p_cf.clone()), p_cf).unwrap();

    let mut visited = Vec::new();
    traverse_tree(expr.as_ref(), &mut |node| visited.push(node.name()));
    // Children fully before parents, left to right.
    assert_eq!(visited, ["parameter", "sin", "parameter", "mult"]);
}

#[test]
fn traversal_revisits_shared_subtrees_once_per_path() {
    let p = parameter(0.5);
    let p_cf: CoeffRef = p.clone();
    let s = sin(p_cf);
    let expr = mul(s.clone(), s).unwrap();

    // The shared sin subtree is reachable through two parent paths, so it
    // (and its child) are visited twice; deduplication is the visitor's job.
    let mut visited = Vec::new();
    traverse_tree(expr.as_ref(), &mut |node| visited.push(node.name()));
    assert_eq!(visited, ["parameter", "sin", "parameter", "sin", "mult"]);
    assert_eq!(visited.iter().filter(|&&name| name == "sin").count(), 2);
}

#[test]
fn tree_reports_indent_by_depth() {
    let p = parameter(0.5);
    let p_cf: CoeffRef = p.clone();
    let expr = mul(sin(p_cf.clone()), p_cf).unwrap();

    let report = tree_report(expr.as_ref());
    let lines: Vec<_> = report.lines().collect();
    assert_eq!(lines[0], "mult (scalar)");
    assert_eq!(lines[1], "  sin (scalar)");
    assert_eq!(lines[2], "    parameter (scalar)");
    assert_eq!(lines[3], "  parameter (scalar)");
    assert_eq!(lines.len(), 4);
}
