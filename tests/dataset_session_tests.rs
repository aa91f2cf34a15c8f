// tests/dataset_session_tests.rs

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use pinv_engine::schema::{read_matrix_page, write_matrix_columns, PageMatrix};
use pinv_engine::{
    c64, ColumnData, ComplexPseudoInverseEngine, Dataset, EngineWarning, LayoutOptions, MultiplyMode, OutputOptions,
    Page, PseudoInverseConfig, RealPseudoInverseEngine, RegularizationConfig, SingularValueLayout, WeightSource,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
}

/// Page with optional `Name` row labels and numeric columns `<prefix><j>`.
fn page_of(row_names: Option<&[&str]>, prefix: &str, matrix: &Array2<f64>) -> Page {
    let mut page = Page::new();
    if let Some(names) = row_names {
        page = page.with_column("Name", ColumnData::Text(strings(names))).unwrap();
    }
    for (j, column) in matrix.columns().into_iter().enumerate() {
        page = page
            .with_column(format!("{}{}", prefix, j), ColumnData::Double(column.to_vec()))
            .unwrap();
    }
    page
}

fn numbers(page: &Page, name: &str) -> Vec<f64> {
    page.column(name)
        .and_then(|c| c.data.to_f64())
        .unwrap_or_else(|| panic!("missing numeric column {}", name))
}

fn labels(page: &Page, name: &str) -> Vec<String> {
    page.column(name)
        .and_then(|c| c.data.as_text())
        .unwrap_or_else(|| panic!("missing string column {}", name))
        .to_vec()
}

fn column_names(page: &Page) -> Vec<String> {
    page.columns().iter().map(|c| c.name.clone()).collect()
}

#[test]
fn primary_output_layout_and_parameters() {
    let a = array![[1.0, 0.0], [0.0, 2.0], [0.0, 0.0]];
    let input = Dataset::new()
        .with_source("input.sdds")
        .with_page(page_of(Some(&["r0", "r1", "r2"]), "C", &a));
    let config = PseudoInverseConfig {
        regularization: RegularizationConfig { min_ratio: 0.001, delete_indices: vec![7], ..Default::default() },
        ..Default::default()
    };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, None).unwrap();
    assert!(outputs.singular_values.is_none());
    assert!(outputs.left_singular_vectors.is_none());
    assert!(outputs.reconstruction.is_none());

    let page = outputs.primary.page(0).unwrap();
    assert_eq!(column_names(page), strings(&["OldColumnNames", "r0", "r1", "r2"]));
    assert_eq!(labels(page, "OldColumnNames"), strings(&["C0", "C1"]));
    let r1 = numbers(page, "r1");
    assert_abs_diff_eq!(r1[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(r1[1], 0.5, epsilon = 1e-12);

    let parameter = |name: &str| page.parameter(name).unwrap_or_else(|| panic!("missing parameter {}", name));
    assert_eq!(parameter("MinimumSingularValueRatio").as_f64(), Some(0.001));
    assert_eq!(parameter("NumberOfSingularValuesUsed").as_i64(), Some(2));
    assert_eq!(parameter("DeletedVectors").as_str(), Some(""));
    assert_abs_diff_eq!(parameter("ConditionNumber").as_f64().unwrap(), 2.0, epsilon = 1e-12);
    assert_eq!(parameter("InputFile").as_str(), Some("input.sdds"));
    assert_eq!(parameter("TikhonovFilterUsed").as_i64(), Some(0));
    assert_eq!(parameter("TikhonovAlpha").as_f64(), Some(0.0));

    let s = page.array("SingularValues").unwrap();
    assert_eq!(s.len(), 2);
    assert_abs_diff_eq!(s[0], 2.0, epsilon = 1e-12);
    assert_eq!(page.array("SingularValuesUsed").unwrap().len(), 2);
    assert_abs_diff_eq!(page.array("InverseSingularValues").unwrap()[0], 0.5, epsilon = 1e-12);

    let report = &outputs.report.pages[0];
    assert_eq!((report.rows, report.cols), (3, 2));
    assert_eq!(report.diagnostics.retained, 2);
}

#[test]
fn deleted_vectors_are_listed_in_order() {
    let a = random_matrix(5, 4, 3);
    let input = Dataset::new().with_page(page_of(None, "C", &a));
    let config = PseudoInverseConfig {
        regularization: RegularizationConfig { delete_indices: vec![3, 0, 3, 9], ..Default::default() },
        ..Default::default()
    };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, None).unwrap();
    let page = outputs.primary.page(0).unwrap();
    assert_eq!(page.parameter("DeletedVectors").and_then(|p| p.as_str()), Some("0 3"));
    assert_eq!(page.parameter("NumberOfSingularValuesUsed").and_then(|p| p.as_i64()), Some(2));
    assert_eq!(page.parameter("InputFile").and_then(|p| p.as_str()), Some(""));
}

#[test]
fn auxiliary_outputs_use_singular_vector_names() {
    let a = random_matrix(4, 2, 5);
    let input = Dataset::new().with_page(page_of(None, "C", &a));
    let config = PseudoInverseConfig {
        outputs: OutputOptions {
            emit_u: true,
            emit_v: true,
            emit_s: Some(SingularValueLayout::Table),
            ..Default::default()
        },
        layout: LayoutOptions { root: Some("Row".into()), ..Default::default() },
        ..Default::default()
    };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, None).unwrap();

    let primary = outputs.primary.page(0).unwrap();
    assert_eq!(column_names(primary), strings(&["OldColumnNames", "Row000", "Row001", "Row002", "Row003"]));

    let u = outputs.left_singular_vectors.as_ref().unwrap().page(0).unwrap();
    assert_eq!(column_names(u), strings(&["OriginalRows", "SV000", "SV001"]));
    assert_eq!(labels(u, "OriginalRows"), strings(&["Row000", "Row001", "Row002", "Row003"]));

    let v = outputs.right_singular_vectors.as_ref().unwrap().page(0).unwrap();
    assert_eq!(column_names(v), strings(&["OldColumnNames", "SV000", "SV001"]));
    assert_eq!(labels(v, "OldColumnNames"), strings(&["C0", "C1"]));
    let v0 = numbers(v, "SV000");
    assert_abs_diff_eq!(v0.iter().map(|x| x * x).sum::<f64>(), 1.0, epsilon = 1e-12);

    let s = outputs.singular_values.as_ref().unwrap().page(0).unwrap();
    assert_eq!(column_names(s), strings(&["Index", "SingularValues"]));
    assert_eq!(s.column("Index").unwrap().data, ColumnData::Integer(vec![0, 1]));
    let values = numbers(s, "SingularValues");
    assert_eq!(values, primary.array("SingularValues").unwrap().to_vec());
}

#[test]
fn left_vectors_keep_the_row_name_column() {
    let a = random_matrix(3, 3, 6);
    let input = Dataset::new().with_page(page_of(Some(&["x", "y", "z"]), "C", &a));
    let config = PseudoInverseConfig {
        outputs: OutputOptions { emit_u: true, emit_s: Some(SingularValueLayout::Matrix), ..Default::default() },
        ..Default::default()
    };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, None).unwrap();
    let u = outputs.left_singular_vectors.as_ref().unwrap().page(0).unwrap();
    assert_eq!(labels(u, "Name"), strings(&["x", "y", "z"]));

    let s = outputs.singular_values.as_ref().unwrap().page(0).unwrap();
    assert_eq!(column_names(s), strings(&["SV000", "SV001", "SV002"]));
    let middle = numbers(s, "SV001");
    assert_eq!(middle[0], 0.0);
    assert_eq!(middle[2], 0.0);
    assert!(middle[1] > 0.0);
}

#[test]
fn companion_products_are_labelled_by_their_factors() {
    let a = random_matrix(3, 2, 10);
    let b_post = random_matrix(3, 4, 11);
    let input = Dataset::new().with_page(page_of(Some(&["r0", "r1", "r2"]), "C", &a));
    let post = Dataset::new().with_page(page_of(Some(&["r0", "r1", "r2"]), "B", &b_post));
    let config = PseudoInverseConfig { multiply: MultiplyMode::Post, ..Default::default() };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, Some(&post)).unwrap();
    let page = outputs.primary.page(0).unwrap();
    assert_eq!(column_names(page), strings(&["OldColumnNames", "B0", "B1", "B2", "B3"]));
    assert_eq!(labels(page, "OldColumnNames"), strings(&["C0", "C1"]));

    let b_pre = random_matrix(5, 2, 12);
    let pre = Dataset::new().with_page(page_of(Some(&["p0", "p1", "p2", "p3", "p4"]), "D", &b_pre));
    let config = PseudoInverseConfig { multiply: MultiplyMode::Pre, ..Default::default() };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, Some(&pre)).unwrap();
    let page = outputs.primary.page(0).unwrap();
    assert_eq!(column_names(page), strings(&["OldColumnNames", "r0", "r1", "r2"]));
    assert_eq!(labels(page, "OldColumnNames"), strings(&["p0", "p1", "p2", "p3", "p4"]));

    // Wrong companion shape fails the page only.
    let wrong = Dataset::new().with_page(page_of(None, "B", &random_matrix(2, 4, 13)));
    let config = PseudoInverseConfig { multiply: MultiplyMode::Post, ..Default::default() };
    let mut engine = RealPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, Some(&wrong)).unwrap();
    assert!(outputs.primary.is_empty());
    assert_eq!(outputs.report.failures.len(), 1);
}

#[test]
fn complex_session_reads_real_imag_pairs() {
    let page = Page::new()
        .with_column("Name", ColumnData::Text(strings(&["a", "b"])))
        .unwrap()
        .with_column("RealX", ColumnData::Double(vec![1.0, 0.0]))
        .unwrap()
        .with_column("ImagX", ColumnData::Double(vec![0.0, 1.0]))
        .unwrap()
        .with_column("Weight", ColumnData::Double(vec![5.0, 6.0]))
        .unwrap()
        .with_column("RealY", ColumnData::Double(vec![0.0, 1.0]))
        .unwrap()
        .with_column("ImagY", ColumnData::Double(vec![1.0, 0.0]))
        .unwrap();
    let input = Dataset::new().with_page(page.clone());
    let config = PseudoInverseConfig {
        outputs: OutputOptions { reconstruct: true, ..Default::default() },
        ..Default::default()
    };
    let mut engine = ComplexPseudoInverseEngine::new(config).unwrap();
    let outputs = engine.run(&input, None).unwrap();

    let primary = outputs.primary.page(0).unwrap();
    assert_eq!(
        column_names(primary),
        strings(&["OldColumnNames", "Reala", "Imaga", "Realb", "Imagb"])
    );
    assert_eq!(labels(primary, "OldColumnNames"), strings(&["X", "Y"]));
    assert!(primary.parameter("TikhonovAlpha").is_none());
    // A = [[1, i], [i, 1]], A+ = 0.5 [[1, -i], [-i, 1]].
    let (re_a, im_a) = (numbers(primary, "Reala"), numbers(primary, "Imaga"));
    assert_abs_diff_eq!(re_a[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(im_a[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(re_a[1], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(im_a[1], -0.5, epsilon = 1e-12);

    let rec = outputs.reconstruction.as_ref().unwrap().page(0).unwrap();
    assert_eq!(column_names(rec), column_names(&page));
    assert_eq!(numbers(rec, "Weight"), vec![5.0, 6.0]);
    for name in ["RealX", "ImagX", "RealY", "ImagY"] {
        for (x, y) in numbers(rec, name).iter().zip(numbers(&page, name).iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }
    assert_eq!(rec.parameter("NumberOfSingularValuesUsed").and_then(|p| p.as_i64()), Some(2));
}

#[test]
fn complex_columns_round_trip_exactly() {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let matrix = Array2::from_shape_fn((4, 3), |_| c64::new(rng.gen_range(-1e3..1e3), rng.gen_range(-1e-3..1e-3)));
    let names = strings(&["u", "v", "w"]);
    let mut page = Page::new();
    write_matrix_columns(&mut page, &names, matrix.view()).unwrap();
    assert_eq!(column_names(&page), strings(&["Realu", "Imagu", "Realv", "Imagv", "Realw", "Imagw"]));

    let read: PageMatrix<c64> = read_matrix_page(&page, &LayoutOptions::default(), true).unwrap();
    assert_eq!(read.column_names, names);
    assert_eq!(read.matrix, matrix);
    assert_eq!(read.row_names, strings(&["Column000", "Column001", "Column002", "Column003"]));
}

#[test]
fn outputs_survive_save_and_load() {
    let a = random_matrix(4, 3, 21);
    let input = Dataset::new().with_source("a.sdds").with_page(page_of(Some(&["a", "b", "c", "d"]), "C", &a));
    let mut engine = RealPseudoInverseEngine::new(PseudoInverseConfig::default()).unwrap();
    let outputs = engine.run(&input, None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pinv.bin");
    outputs.primary.save(&path).unwrap();
    let loaded = Dataset::load(&path).unwrap();
    assert_eq!(loaded, outputs.primary);

    input.save(dir.path().join("input.bin")).unwrap();
    let reloaded = Dataset::load(dir.path().join("input.bin")).unwrap();
    let mut again = RealPseudoInverseEngine::new(PseudoInverseConfig::default()).unwrap();
    assert_eq!(again.run(&reloaded, None).unwrap().primary, outputs.primary);
}

#[test]
fn pages_are_independent_of_their_neighbours() {
    let a = random_matrix(5, 3, 31);
    let b = random_matrix(2, 6, 32);
    let names = ["r0", "r1", "r2", "r3", "r4"];
    let single = Dataset::new().with_page(page_of(Some(&names), "C", &a));
    let sequence = Dataset::new()
        .with_page(page_of(Some(&names), "C", &a))
        .with_page(page_of(Some(&["q0", "q1"]), "C", &b))
        .with_page(page_of(Some(&names), "C", &a));

    let mut engine = RealPseudoInverseEngine::new(PseudoInverseConfig::default()).unwrap();
    let alone = engine.run(&single, None).unwrap();
    let all = engine.run(&sequence, None).unwrap();
    assert_eq!(all.primary.page_count(), 3);
    assert_eq!(all.primary.page(0), alone.primary.page(0));
    assert_eq!(all.primary.page(2), alone.primary.page(0));
    assert_eq!(all.primary.page(1).unwrap().row_count(), 6);
}

#[test]
fn weight_name_problems_are_reported() {
    let a = array![[1.0, 2.0], [3.0, 1.0], [1.0, 1.0]];
    let input = Dataset::new().with_page(page_of(Some(&["r0", "r1", "r2"]), "C", &a));
    let weights = Page::new()
        .with_column("Name", ColumnData::Text(strings(&["r0", "r2", "r0"])))
        .unwrap()
        .with_column("Weight", ColumnData::Double(vec![2.0, -1.0, 4.0]))
        .unwrap();
    let source = WeightSource::new(Dataset::new().with_source("weights.sdds").with_page(weights), "Name", "Weight");
    let mut engine = RealPseudoInverseEngine::new(PseudoInverseConfig::default())
        .unwrap()
        .with_row_weight_source(source);
    let outputs = engine.run(&input, None).unwrap();
    assert_eq!(outputs.primary.page_count(), 1);

    let warnings = &outputs.report.warnings;
    assert!(warnings.contains(&EngineWarning::DuplicateWeightName {
        name: "r0".into(),
        source_name: "weights.sdds".into()
    }));
    assert!(warnings.contains(&EngineWarning::UnmatchedWeightName {
        name: "r1".into(),
        source_name: "weights.sdds".into()
    }));
    assert!(warnings.contains(&EngineWarning::NonPositiveWeight { name: "r2".into(), value: -1.0 }));
}
