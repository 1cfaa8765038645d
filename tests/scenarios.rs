use rust_python_uspr::{
    agreement_forests, forests_from_newick, lower_bound, replug_distance, tbr_distance, upper_bound,
    uspr_distance, DistanceConfig, DistanceError, LabelStyle, SearchStatus,
};

#[test]
fn identical_quartets() {
    let (labels, f1, f2) = forests_from_newick("((A,B),(C,D));", "((B,A),(D,C));").unwrap();
    let config = DistanceConfig::default().with_witness();

    let tbr = tbr_distance(&f1, &f2, &config).unwrap();
    assert_eq!(tbr.distance, 0);
    let witness = tbr.witness.unwrap();
    assert_eq!(witness.component_count(), 1);
    assert_eq!(witness.to_newick(LabelStyle::Names(&labels)), "(A,B,(C,D));");

    assert_eq!(uspr_distance(&f1, &f2, &config).unwrap().distance, 0);
    let replug = replug_distance(&f1, &f2, &config).unwrap();
    assert_eq!(replug.distance, 0);
    assert_eq!(replug.witness.unwrap().component_count(), 1);
}

#[test]
fn single_spr_move_on_six_leaves() {
    let (labels, f1, f2) = forests_from_newick("((A,B),(C,D),(E,F));", "(B,(C,D),(E,(F,A)));").unwrap();
    let config = DistanceConfig::default().with_witness();

    let tbr = tbr_distance(&f1, &f2, &config).unwrap();
    assert_eq!(tbr.distance, 1);
    assert_eq!(tbr.status, SearchStatus::Optimal);
    let witness = tbr.witness.unwrap();
    assert_eq!(witness.component_count(), 2);
    assert_eq!(witness.to_newick(LabelStyle::Names(&labels)), "A; (B,(C,D),(E,F));");

    assert_eq!(uspr_distance(&f1, &f2, &config).unwrap().distance, 1);
    assert_eq!(replug_distance(&f1, &f2, &config).unwrap().distance, 1);
    assert_eq!(lower_bound(&f1, &f2).unwrap(), 1);
    assert_eq!(upper_bound(&f1, &f2).unwrap(), 1);
}

#[test]
fn label_mismatch_is_rejected_everywhere() {
    // E only in the first tree
    let first = "((A,B),(C,(D,E)));";
    let second = "((A,B),(C,D));";
    assert!(matches!(
        forests_from_newick(first, second),
        Err(DistanceError::TaxaMismatch { .. })
    ));

    // the same mismatch on forests built over one label map
    let (_, five, _) = forests_from_newick(first, first).unwrap();
    let (_, four, _) = forests_from_newick("((A,B),(C,(D,X)));", "((A,B),(C,(D,X)));").unwrap();
    let pruned = four.restrict_to(&[vec![0, 1, 2, 3]]).unwrap();
    let config = DistanceConfig::default();
    assert!(matches!(lower_bound(&five, &pruned), Err(DistanceError::LabelMismatch { .. })));
    assert!(matches!(upper_bound(&five, &pruned), Err(DistanceError::LabelMismatch { .. })));
    assert!(matches!(tbr_distance(&five, &pruned, &config), Err(DistanceError::LabelMismatch { .. })));
    assert!(matches!(uspr_distance(&five, &pruned, &config), Err(DistanceError::LabelMismatch { .. })));
    assert!(matches!(replug_distance(&five, &pruned, &config), Err(DistanceError::LabelMismatch { .. })));
    assert!(agreement_forests(&five, &pruned, &config).is_err());
}

#[test]
fn rooted_and_unrooted_input_agree() {
    let (_, rooted, unrooted) = forests_from_newick("(((A,B),C),(D,E));", "((A,B),C,(D,E));").unwrap();
    let config = DistanceConfig::default();
    assert_eq!(tbr_distance(&rooted, &unrooted, &config).unwrap().distance, 0);
    assert_eq!(uspr_distance(&rooted, &unrooted, &config).unwrap().distance, 0);
}

#[test]
fn branch_lengths_and_annotations_are_ignored() {
    let (_, f1, f2) = forests_from_newick(
        "((A:[&rate=0.3]0.1,B:0.2):0.5,(C:0.1,D:0.4):0.2);",
        "((A,C),(B,D));",
    )
    .unwrap();
    let config = DistanceConfig::default();
    assert_eq!(tbr_distance(&f1, &f2, &config).unwrap().distance, 1);
}

#[test]
fn node_limit_degrades_to_a_tagged_bound() {
    let (_, f1, f2) = forests_from_newick(
        "(((((((A,B),C),D),E),F),G),(H,(I,J)));",
        "(((((((J,E),H),A),G),C),I),(B,(F,D)));",
    )
    .unwrap();
    let exact = tbr_distance(&f1, &f2, &DistanceConfig::default()).unwrap();
    assert!(exact.is_optimal());
    let limited = tbr_distance(&f1, &f2, &DistanceConfig::default().with_node_limit(1)).unwrap();
    assert!(limited.distance >= exact.distance);
    match limited.status {
        SearchStatus::Optimal => assert_eq!(limited.distance, exact.distance),
        SearchStatus::Bounded { lower } => assert!(lower <= exact.distance),
    }
}

#[test]
fn uspr_node_limit_stays_within_replug() {
    // the {A,B} cherry moves from the end of the spine to between E and F
    let (_, f1, f2) = forests_from_newick(
        "(((((((A,B),C),D),E),F),G),H);",
        "((((((C,D),E),(A,B)),F),G),H);",
    )
    .unwrap();
    let exact = uspr_distance(&f1, &f2, &DistanceConfig::default()).unwrap();
    assert_eq!(exact.distance, 1);
    assert!(exact.is_optimal());
    assert_eq!(replug_distance(&f1, &f2, &DistanceConfig::default()).unwrap().distance, 2);

    let config = DistanceConfig::default().with_node_limit(0);
    let limited = uspr_distance(&f1, &f2, &config).unwrap();
    assert_eq!(limited.status, SearchStatus::Bounded { lower: 1 });
    assert!(limited.distance >= exact.distance);
    assert!(limited.distance <= replug_distance(&f1, &f2, &config).unwrap().distance);
}
