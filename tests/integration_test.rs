use async_trait::async_trait;
use biz_analyst::analysis::{Analysis, AnalysisResult};
use biz_analyst::config::AnalystConfig;
use biz_analyst::data_assistant::{DataAssistant, Explanation, Outcome};
use biz_analyst::error::AnalystError;
use biz_analyst::intent::Intent;
use biz_analyst::llm::{CompletionClient, CompletionRequest, LlmError};
use biz_analyst::tables::{
    load_coupons, load_marketing, load_sales, load_tax, preview_dataset, CanonicalTables, Dataset,
};
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

const SALES_CSV: &str = "\
CustomerID,Transaction_ID,Transaction_Date,Product_SKU,Product_Description,Product_Category,Quantity,Avg_Price,Delivery_Charges,Coupon_Status
17850,16679,3/15/2022,GGOENEBJ079499,Hoodie,Apparel,10,20,6.5,Used
17850,16680,3/16/2022,GGOENEBQ078999,Nest Cam,Nest-USA,2,150,6.5,Not Used
12047,16681,4/2/2022,GGOEGFKQ020399,Notebook,Office,5,4,6.5,Clicked
12047,16682,not-a-date,GGOEGFKQ020399,Notebook,Office,1,4,6.5,
";

const COUPONS_CSV: &str = "\
Month,Product_Category,Coupon_Code,Discount_pct
Mar,Apparel,SALE15,15
03,Nest-USA,NE10,10
Apr,Office,OFF5,5
";

const MARKETING_CSV: &str = "\
Date,Offline_Spend,Online_Spend
3/1/2022,600,400
4/1/2022,300,
";

const TAX_CSV: &str = "\
Product_Category,GST
Apparel,5
Nest-USA,10
";

fn canonical_tables() -> CanonicalTables {
    CanonicalTables {
        sales: load_sales(SALES_CSV.as_bytes()).unwrap(),
        coupons: load_coupons(COUPONS_CSV.as_bytes()).unwrap(),
        marketing: load_marketing(MARKETING_CSV.as_bytes()).unwrap(),
        tax: load_tax(TAX_CSV.as_bytes()).unwrap(),
    }
}

/// Replays scripted replies in order and records every request.
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
    }
}

fn test_config() -> AnalystConfig {
    AnalystConfig {
        retry_backoff_ms: 0,
        ..Default::default()
    }
}

fn assistant(client: Arc<ScriptedClient>) -> DataAssistant {
    DataAssistant::new(&canonical_tables(), client, &test_config()).unwrap()
}

#[tokio::test]
async fn underperforming_question_runs_that_analysis_only() {
    let client = ScriptedClient::new(vec![
        Ok("underperforming_products".to_string()),
        Ok("Office trails every other category.".to_string()),
    ]);
    let assistant = assistant(client.clone());

    let response = assistant
        .answer("Which categories are underperforming?")
        .await
        .unwrap();

    assert_eq!(response.intent, Intent::UnderperformingProducts);
    let result = response.result().expect("analysis result");
    assert_eq!(result.analysis(), Analysis::UnderperformingProducts);
    let AnalysisResult::UnderperformingProducts(rows) = result else {
        panic!("wrong analysis: {:?}", result);
    };
    let categories: Vec<&str> = rows.iter().filter_map(|r| r.category.as_deref()).collect();
    assert_eq!(categories, vec!["Office", "Apparel", "Nest-USA"]);
    assert_eq!(rows[0].total_revenue, 24.0);
    assert_eq!(
        response.explanation(),
        Some(&Explanation::Generated("Office trails every other category.".to_string()))
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].temperature, 0.0);
    assert!(requests[0].prompt().contains("Which categories are underperforming?"));
    assert!(requests[1].temperature > 0.0);
    assert!(requests[1].prompt().contains("Office"));
}

#[tokio::test]
async fn enrichment_joins_text_months_and_applies_defaults() {
    let client = ScriptedClient::new(vec![]);
    let assistant = assistant(client);
    let rows = assistant.table().rows();

    let apparel = &rows[0];
    assert_eq!(apparel.revenue, 200.0);
    assert_eq!(apparel.discount_pct, 15.0);
    assert_eq!(apparel.gst_pct, 5.0);
    assert_eq!(apparel.marketing_spend, Some(1000.0));

    let nest = &rows[1];
    assert_eq!(nest.discount_pct, 10.0);

    let office = &rows[2];
    assert_eq!(office.discount_pct, 5.0);
    assert_eq!(office.gst_pct, 0.0);
    assert_eq!(office.marketing_spend, Some(300.0));

    let undated = &rows[3];
    assert_eq!(undated.year, None);
    assert_eq!(undated.discount_pct, 0.0);
    assert_eq!(undated.marketing_spend, None);
    assert_eq!(undated.coupon_status, "No Coupon");
}

#[tokio::test]
async fn verbose_label_is_not_understood_and_skips_narration() {
    let client = ScriptedClient::new(vec![Ok("sales_trend please".to_string())]);
    let assistant = assistant(client.clone());

    let response = assistant.answer("How are sales trending?").await.unwrap();

    assert_eq!(response.intent, Intent::Unknown);
    assert!(matches!(response.outcome, Outcome::NotUnderstood));
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn classifier_outage_is_an_error_not_unknown() {
    let client = ScriptedClient::new(vec![
        Err(LlmError::Transport("connection reset".to_string())),
        Err(LlmError::Transport("connection reset".to_string())),
    ]);
    let assistant = assistant(client.clone());

    let err = assistant.answer("How are sales trending?").await.unwrap_err();

    assert!(matches!(err, AnalystError::ClassificationUnavailable(_)));
    // One attempt plus one bounded retry, and no narration attempt.
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn narrative_outage_still_returns_the_analysis() {
    let client = ScriptedClient::new(vec![
        Ok("sales_trend".to_string()),
        Err(LlmError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }),
        Err(LlmError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }),
    ]);
    let assistant = assistant(client);

    let response = assistant.answer("How are sales trending?").await.unwrap();

    assert_eq!(response.intent, Intent::SalesTrend);
    let result = response.result().expect("analysis survives narration failure");
    assert_eq!(result.len(), 4);
    match response.explanation() {
        Some(Explanation::Unavailable(reason)) => assert!(reason.contains("503"), "{}", reason),
        other => panic!("expected unavailable explanation, got {:?}", other),
    }
}

#[tokio::test]
async fn response_carries_the_preview_the_narrator_saw() {
    let client = ScriptedClient::new(vec![
        Ok("sales_trend".to_string()),
        Ok("March leads.".to_string()),
    ]);
    let config = AnalystConfig {
        preview_rows: 2,
        ..test_config()
    };
    let assistant = DataAssistant::new(&canonical_tables(), client.clone(), &config).unwrap();

    let response = assistant.answer("How are sales trending?").await.unwrap();

    assert_eq!(response.result().map(|r| r.len()), Some(4));
    let preview = response.preview().expect("preview alongside the result");
    assert_eq!(preview.analysis(), Analysis::SalesTrend);
    assert_eq!(preview.rows_shown(), 2);
    assert_eq!(preview.total_rows(), 4);

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt().contains("2 of 4 rows"));
    assert!(requests[1].prompt().contains(preview.table()));
}

#[tokio::test]
async fn enriched_table_is_shared_across_questions() {
    let client = ScriptedClient::new(vec![
        Ok("discount_vs_revenue".to_string()),
        Ok("first".to_string()),
        Ok("discount_vs_revenue".to_string()),
        Ok("second".to_string()),
    ]);
    let assistant = assistant(client);
    let table_before = Arc::clone(assistant.table());

    let first = assistant.answer("Do discounts drive revenue?").await.unwrap();
    let second = assistant.answer("Do discounts drive revenue?").await.unwrap();

    assert!(Arc::ptr_eq(&table_before, assistant.table()));
    assert_eq!(first.result(), second.result());
    assert_ne!(first.query_id, second.query_id);
}

#[tokio::test]
async fn response_serialises_with_tagged_outcome() {
    let client = ScriptedClient::new(vec![
        Ok("discount_vs_revenue".to_string()),
        Ok("Discounts lift Apparel.".to_string()),
    ]);
    let assistant = assistant(client);

    let response = assistant.answer("Do discounts help?").await.unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["intent"], "discount_vs_revenue");
    assert_eq!(json["outcome"]["status"], "analysed");
    assert_eq!(json["outcome"]["result"]["analysis"], "discount_vs_revenue");
    assert_eq!(json["outcome"]["preview"]["analysis"], "discount_vs_revenue");
    assert_eq!(json["outcome"]["preview"]["rows_shown"], 3);
    assert_eq!(json["outcome"]["preview"]["total_rows"], 3);
    assert_eq!(json["outcome"]["explanation"]["kind"], "generated");
    assert_eq!(json["outcome"]["explanation"]["text"], "Discounts lift Apparel.");
}

#[test]
fn canonical_tables_load_from_a_data_directory() {
    let dir = std::env::temp_dir().join(format!("biz-analyst-load-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Online_Sales.csv"), SALES_CSV).unwrap();
    fs::write(dir.join("Discount_Coupon.csv"), COUPONS_CSV).unwrap();
    fs::write(dir.join("Marketing_Spend.csv"), MARKETING_CSV).unwrap();
    fs::write(dir.join("Tax_amount.csv"), TAX_CSV).unwrap();

    let tables = CanonicalTables::load(&dir).unwrap();
    assert_eq!(tables.sales.len(), 4);
    assert_eq!(tables.coupons.len(), 3);

    fs::remove_file(dir.join("Tax_amount.csv")).unwrap();
    assert!(matches!(
        CanonicalTables::load(&dir),
        Err(AnalystError::Ingestion(_))
    ));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_customer_file_does_not_block_loading() {
    let dir = std::env::temp_dir().join(format!("biz-analyst-customers-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Online_Sales.csv"), SALES_CSV).unwrap();
    fs::write(dir.join("Discount_Coupon.csv"), COUPONS_CSV).unwrap();
    fs::write(dir.join("Marketing_Spend.csv"), MARKETING_CSV).unwrap();
    fs::write(dir.join("Tax_amount.csv"), TAX_CSV).unwrap();
    fs::write(
        dir.join("CustomersData.csv"),
        "CustomerID,Gender,Location,Tenure_Months\n17850,M,Chicago,twelve\n",
    )
    .unwrap();

    let tables = CanonicalTables::load(&dir).unwrap();
    assert_eq!(tables.sales.len(), 4);
    let table = biz_analyst::enrich::enrich(&tables).unwrap();
    assert_eq!(table.len(), 4);

    let preview = preview_dataset(&dir, Dataset::Customers, 5).unwrap();
    assert_eq!(preview.rows, 1);
    assert_eq!(preview.columns, 4);

    fs::remove_dir_all(&dir).ok();
}
