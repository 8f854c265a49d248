//! End-to-end tests over the embedded 2025 data set.

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tax_core::{
    Backend, BackendRegistry, CalcError, CalculationPipeline, DbConfig, FilingStatusCode,
    ResultSource, SnapshotRef, StateCode, TaxReturn,
};
use tax_data::{TaxDataError, TaxDataSet};
use tax_db_sqlite::SqliteBackendFactory;

fn data() -> TaxDataSet {
    TaxDataSet::embedded().expect("embedded data is valid")
}

fn state(code: &str) -> StateCode {
    StateCode::parse(code).unwrap()
}

fn single_wage_earner() -> TaxReturn {
    let mut tax_return = TaxReturn::new(1, 2025, FilingStatusCode::Single);
    tax_return.income.wages = dec!(85000);
    tax_return.payments.federal_withholding = dec!(16000);
    tax_return
}

fn pipeline(backend: Backend) -> CalculationPipeline {
    let data = data();
    CalculationPipeline::new(data.federal_engine(), data.state_registry(), backend)
}

// =============================================================================
// Data set
// =============================================================================

#[test]
fn test_embedded_data_has_all_jurisdictions() {
    let registry = data().state_registry();

    let codes: Vec<String> = registry
        .jurisdictions()
        .into_iter()
        .map(|(code, _)| code.to_string())
        .collect();

    assert_eq!(codes.len(), 51);
    assert!(codes.contains(&"DC".to_string()));
    for no_tax in ["AK", "FL", "NV", "NH", "SD", "TN", "TX", "WY"] {
        let calculator = registry.get(state(no_tax), 2025).unwrap();
        assert!(!calculator.config().has_income_tax, "{no_tax}");
    }
}

#[test]
fn test_embedded_federal_brackets_come_from_csv() {
    let params = data().federal_engine().parameters(2025).unwrap();

    let single = params.brackets.get(FilingStatusCode::Single);
    assert_eq!(single.len(), 7);
    assert_eq!(single[6].threshold, dec!(626350));
    assert_eq!(
        params.brackets.get(FilingStatusCode::QualifyingSurvivingSpouse),
        params.brackets.get(FilingStatusCode::MarriedFilingJointly)
    );
}

#[test]
fn test_load_dir_matches_embedded() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

    let loaded = TaxDataSet::load_dir(dir).unwrap();

    assert_eq!(loaded.years(), vec![2025]);
    assert_eq!(
        loaded.federal_engine().parameters(2025).unwrap(),
        data().federal_engine().parameters(2025).unwrap()
    );
    assert_eq!(loaded.state_registry().len(), 51);
}

#[test]
fn test_load_dir_without_years_is_an_error() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/src");

    let err = TaxDataSet::load_dir(dir).unwrap_err();

    assert!(matches!(err, TaxDataError::Config(_)), "got {err:?}");
}

// =============================================================================
// Calculations
// =============================================================================

#[test]
fn test_federal_single_wage_earner() {
    let federal = data().federal_engine().calculate(&single_wage_earner()).unwrap();

    assert_eq!(federal.agi, dec!(85000));
    assert_eq!(federal.standard_deduction, dec!(15750));
    assert_eq!(federal.taxable_income, dec!(69250));
    assert_eq!(federal.total_tax, dec!(10149.00));
    assert_eq!(federal.refund_or_owed, dec!(5851.00));
    assert_eq!(federal.marginal_rate, dec!(0.22));
}

#[test]
fn test_illinois_flat_tax_with_exemption() {
    let data = data();
    let tax_return = single_wage_earner();
    let federal = data.federal_engine().calculate(&tax_return).unwrap();

    let result = data
        .state_registry()
        .get(state("IL"), 2025)
        .unwrap()
        .calculate(&tax_return, &federal)
        .unwrap();

    assert_eq!(result.exemption_total, dec!(2850));
    assert_eq!(result.taxable_income, dec!(82150));
    assert_eq!(result.bracket_tax, dec!(4066.43));
    assert_eq!(result.net_tax_liability, dec!(4066.43));
    assert_eq!(result.refund_or_owed, dec!(-4066.43));
}

#[test]
fn test_california_progressive_tax_with_exemption_credit() {
    let data = data();
    let tax_return = single_wage_earner();
    let federal = data.federal_engine().calculate(&tax_return).unwrap();

    let result = data
        .state_registry()
        .get(state("CA"), 2025)
        .unwrap()
        .calculate(&tax_return, &federal)
        .unwrap();

    assert_eq!(result.deduction_amount, dec!(5706));
    assert_eq!(result.taxable_income, dec!(79294));
    assert_eq!(result.bracket_tax, dec!(3812.98));
    assert_eq!(result.state_credits["personal_exemption_credit"], dec!(153));
    assert_eq!(result.net_tax_liability, dec!(3659.98));
}

#[test]
fn test_pennsylvania_local_wage_tax() {
    let data = data();
    let mut tax_return = single_wage_earner();
    tax_return.taxpayer.residency.locality = Some("philadelphia".to_string());
    let federal = data.federal_engine().calculate(&tax_return).unwrap();
    let calculator = data.state_registry().get(state("PA"), 2025).unwrap().clone();

    let city = calculator.calculate(&tax_return, &federal).unwrap();
    tax_return.taxpayer.residency.locality = None;
    let elsewhere = calculator.calculate(&tax_return, &federal).unwrap();

    assert_eq!(city.bracket_tax, dec!(2609.50));
    assert_eq!(city.local_jurisdiction.as_deref(), Some("Philadelphia"));
    assert_eq!(city.local_tax, dec!(3187.50));
    assert_eq!(city.net_tax_liability, dec!(5797.00));
    assert_eq!(elsewhere.local_jurisdiction, None);
    assert_eq!(elsewhere.local_tax, dec!(850.00));
}

#[test]
fn test_washington_taxes_long_term_gains_only() {
    let data = data();
    let calculator = data.state_registry().get(state("WA"), 2025).unwrap().clone();
    let run = |tax_return: &TaxReturn| {
        let federal = data.federal_engine().calculate(tax_return).unwrap();
        calculator.calculate(tax_return, &federal).unwrap()
    };

    let wages_only = run(&single_wage_earner());
    assert!(calculator.config().has_income_tax);
    assert_eq!(wages_only.starting_income, dec!(0));
    assert_eq!(wages_only.net_tax_liability, dec!(0));

    let mut investor = single_wage_earner();
    investor.income.long_term_capital_gains = dec!(400000);
    investor.income.short_term_capital_gains = dec!(20000);
    let gains = run(&investor);
    assert_eq!(gains.starting_income, dec!(400000));
    assert_eq!(gains.deduction_amount, dec!(278000));
    assert_eq!(gains.taxable_income, dec!(122000));
    // 7% of 122,000
    assert_eq!(gains.net_tax_liability, dec!(8540.00));

    investor.income.long_term_capital_gains = dec!(1500000);
    let large = run(&investor);
    // 7% of the first 1,000,000 plus 9.9% of 222,000
    assert_eq!(large.taxable_income, dec!(1222000));
    assert_eq!(large.net_tax_liability, dec!(91978.00));
}

#[test]
fn test_every_state_calculates_the_same_return() {
    let data = data();
    let tax_return = single_wage_earner();
    let federal = data.federal_engine().calculate(&tax_return).unwrap();
    let registry = data.state_registry();

    for (code, year) in registry.jurisdictions() {
        let result = registry
            .get(code, year)
            .unwrap()
            .calculate(&tax_return, &federal)
            .unwrap_or_else(|e| panic!("{code}: {e}"));
        assert!(result.net_tax_liability >= dec!(0), "{code}");
        assert!(result.effective_rate < dec!(0.15), "{code}");
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[tokio::test]
async fn test_pipeline_over_memory_backend() {
    let pipeline = pipeline(Backend::in_memory());
    let tax_return = single_wage_earner();

    let first = pipeline
        .calculate(&tax_return, 2025, Some(state("IL")))
        .await
        .unwrap();
    let second = pipeline
        .calculate(&tax_return, 2025, Some(state("IL")))
        .await
        .unwrap();

    assert_eq!(first.source, ResultSource::Computed);
    assert_eq!(second.source, ResultSource::Cache);
    assert_eq!(first.result, second.result);
    assert_eq!(first.result.federal.total_tax, dec!(10149.00));
    assert_eq!(
        first.result.state.as_ref().map(|s| s.net_tax_liability),
        Some(dec!(4066.43))
    );
}

#[tokio::test]
async fn test_pipeline_over_sqlite_backend() {
    let mut registry = BackendRegistry::with_memory();
    registry.register(Box::new(SqliteBackendFactory));
    let backend = registry
        .create(&DbConfig {
            backend: "sqlite".to_string(),
            connection_string: ":memory:".to_string(),
        })
        .await
        .unwrap();
    let pipeline = pipeline(backend);
    let tax_return = single_wage_earner();

    let computed = pipeline
        .calculate(&tax_return, 2025, Some(state("PA")))
        .await
        .unwrap();
    pipeline.invalidate_all().await.unwrap();
    let rebuilt = pipeline
        .calculate(&tax_return, 2025, Some(state("PA")))
        .await
        .unwrap();

    assert_eq!(computed.source, ResultSource::Computed);
    assert_eq!(rebuilt.source, ResultSource::Snapshot);
    assert_eq!(computed.result, rebuilt.result);

    let snapshot_id = computed.result.snapshot_id.unwrap();
    let snapshot = pipeline
        .get_snapshot(&SnapshotRef::Hash(computed.result.input_hash.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.snapshot_id, snapshot_id);
    assert_eq!(snapshot.total_tax, dec!(10149.00));
    assert_eq!(pipeline.list_snapshots(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pipeline_accepts_json_returns() {
    let pipeline = pipeline(Backend::in_memory());
    let tax_return: TaxReturn = serde_json::from_str(
        r#"{
            "return_id": 7,
            "tax_year": 2025,
            "taxpayer": { "filing_status": "S" },
            "income": { "wages": "85000" },
            "payments": { "federal_withholding": 16000 }
        }"#,
    )
    .unwrap();

    let outcome = pipeline.calculate(&tax_return, 2025, Some(state("TX"))).await.unwrap();

    assert_eq!(outcome.result.federal.refund_or_owed, dec!(5851.00));
    assert_eq!(
        outcome.result.state.map(|s| s.net_tax_liability),
        Some(dec!(0))
    );
}

#[tokio::test]
async fn test_pipeline_rejects_unloaded_year() {
    let pipeline = pipeline(Backend::in_memory());
    let mut tax_return = single_wage_earner();
    tax_return.tax_year = 2019;

    let err = pipeline.calculate(&tax_return, 2019, None).await.unwrap_err();

    assert!(matches!(err, CalcError::Configuration(_)), "got {err:?}");
}
