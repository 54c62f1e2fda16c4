use std::collections::BTreeMap;

use serde::Serialize;

use crate::issue::IssueId;

/// Name of the single function the competitor research request must call.
pub const LIST_COMPETITION: &str = "list_competition";

/// OpenAPI-style schema subset understood by Gemini function declarations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

impl Schema {
    fn scalar(kind: &'static str) -> Self {
        Self {
            kind,
            description: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            items: None,
        }
    }

    fn object<const N: usize>(properties: [(&str, Schema); N], required: &[&str]) -> Self {
        Self {
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
            required: required.iter().map(|name| name.to_string()).collect(),
            ..Self::scalar("OBJECT")
        }
    }

    fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::scalar("ARRAY")
        }
    }

    fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Schema,
}

/// Function declarations for every model request, built once from the issue catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringTools {
    /// One `<ISSUE>_INDEX` function per issue, scoring supplied article text.
    pub article_scoring: Vec<FunctionDeclaration>,
    /// One `<ISSUE>_INDEX` function per issue, scoring from the model's own research.
    pub research_scoring: Vec<FunctionDeclaration>,
    pub competition: Vec<FunctionDeclaration>,
}

impl ScoringTools {
    pub fn new(issues: &[IssueId]) -> Self {
        Self {
            article_scoring: issues
                .iter()
                .map(|issue| observation_function(*issue, article_description(*issue)))
                .collect(),
            research_scoring: issues
                .iter()
                .map(|issue| observation_function(*issue, research_description(*issue)))
                .collect(),
            competition: vec![competition_function()],
        }
    }
}

impl Default for ScoringTools {
    fn default() -> Self {
        Self::new(&IssueId::ALL)
    }
}

fn observation_function(issue: IssueId, description: String) -> FunctionDeclaration {
    FunctionDeclaration {
        name: issue.function_name(),
        description,
        parameters: Schema::object(
            [
                ("weight", Schema::scalar("NUMBER")),
                ("score", Schema::scalar("NUMBER")),
            ],
            &["weight"],
        ),
    }
}

fn article_description(issue: IssueId) -> String {
    let desc = issue.description();
    format!(
        "Given the article(s) in the prompt, indicate how strongly the article(s) relate to \
         \"{desc}\" in regard to the company defined in the prompt as COMPANY NAME. This weight \
         should be a value from 0-100, with 0 meaning it doesn't mention that issue in regards \
         to the company at all, and 100 meaning that issue as it relates to the company is the \
         only thing the article(s) talk about. Then, score the company in the \"{desc}\" \
         category, from 0-100, given the content of the article(s), where 50 means a \
         net-neutral impact, 100 means that the company is a world leader in the category, and \
         0 means they're doing extensive, lasting damage. If the weight is 0, don't include the \
         score."
    )
}

fn research_description(issue: IssueId) -> String {
    let desc = issue.description();
    format!(
        "Regarding \"{desc}\", research and score the company defined in the prompt, from \
         0-100, where 50 means a net-neutral impact, 100 means that the company is a world \
         leader in the category, and 0 means they're doing extensive, lasting damage. Also \
         assign a \"weight\" from 0-100 based on your confidence in this score. If you found 10+ \
         sources about the company regarding that issue, set the weight to 100. If you couldn't \
         find any information about the company, set the score and weight to 0."
    )
}

fn competition_function() -> FunctionDeclaration {
    let competitor_product = Schema::object(
        [
            ("product_name", Schema::scalar("STRING")),
            ("parent_company", Schema::scalar("STRING")),
        ],
        &["product_name", "parent_company"],
    )
    .described("Product name and the company that owns it");
    let availability = Schema::object(
        [
            ("online", Schema::scalar("BOOLEAN")),
            ("in_person", Schema::scalar("BOOLEAN")),
        ],
        &[],
    )
    .described("Where this product is available");
    let product = Schema::object(
        [
            ("product_name", Schema::scalar("STRING")),
            (
                "competitor_products",
                Schema::array(competitor_product)
                    .described("List of the most similar alternative products"),
            ),
            ("availability", availability),
        ],
        &["product_name"],
    );

    FunctionDeclaration {
        name: LIST_COMPETITION.to_string(),
        description: "List 1-20 of the specified company's most valuable products, services, or \
                      properties. For each product, list whether it's commonly available online, \
                      and whether it's commonly available in-person. For example, Alphabet's \
                      search engine Google is available online but not in-person, Apple's iPhone \
                      is available both online and in-person, and Lockheed Martin's F-35 jet is \
                      available neither online nor in-person. Additionally, for each product, \
                      name 1-10 competitor products in order of similarity, such as Bing and \
                      DuckDuckGo for Google. Write each parent company's security name without \
                      class specifications or corporate suffixes such as LLC or Inc."
            .to_string(),
        parameters: Schema::object([("products", Schema::array(product))], &[]),
    }
}
