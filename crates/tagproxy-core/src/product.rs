//! The `Product` record: a supply-chain item.

use crate::{
    Result,
    constants::FIELD_SEPARATOR,
    error::CodecError,
    format::PRODUCT_TOKEN,
    types::{Address, format_timestamp, parse_timestamp, record_timestamp},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields of the product layout, token included.
const PRODUCT_FIELDS: usize = 8;

/// A supply-chain item.
///
/// The supplier address is always present. The customer address is
/// present exactly when the product has been delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProductJson", into = "ProductJson")]
pub struct Product {
    product_type: i32,
    product_id: i64,
    created_at: Option<DateTime<Utc>>,
    supplier: Address,
    delivered_at: Option<DateTime<Utc>>,
    customer: Option<Address>,
    assembled_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn builder(product_type: i32, product_id: i64, supplier: Address) -> ProductBuilder {
        ProductBuilder {
            product_type,
            product_id,
            supplier,
            created_at: None,
            delivered_at: None,
            customer: None,
            assembled_at: None,
        }
    }

    #[must_use]
    pub fn product_type(&self) -> i32 {
        self.product_type
    }

    #[must_use]
    pub fn product_id(&self) -> i64 {
        self.product_id
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    #[must_use]
    pub fn supplier(&self) -> &Address {
        &self.supplier
    }

    #[must_use]
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    #[must_use]
    pub fn customer(&self) -> Option<&Address> {
        self.customer.as_ref()
    }

    #[must_use]
    pub fn assembled_at(&self) -> Option<DateTime<Utc>> {
        self.assembled_at
    }

    /// Human readable summary of the product.
    #[must_use]
    pub fn describe(&self) -> ProductDescription {
        ProductDescription::new(self)
    }

    /// Render the product layout:
    /// `P,<id>,<type>,<created?>,<supplier>,<delivered?>,<customer?>,<assembled?>`.
    #[must_use]
    pub fn to_text(&self) -> String {
        let optional_time = |t: Option<DateTime<Utc>>| {
            t.map(|t| format_timestamp(&t)).unwrap_or_default()
        };
        let fields = [
            PRODUCT_TOKEN.to_string(),
            self.product_id.to_string(),
            self.product_type.to_string(),
            optional_time(self.created_at),
            self.supplier.to_hex(),
            optional_time(self.delivered_at),
            self.customer.map(|c| c.to_hex()).unwrap_or_default(),
            optional_time(self.assembled_at),
        ];
        fields.join(&FIELD_SEPARATOR.to_string())
    }

    /// Parse the fields of the product layout. `fields[0]` is the token.
    pub(crate) fn from_fields(fields: &[&str]) -> Result<Self> {
        if fields.len() != PRODUCT_FIELDS {
            return Err(CodecError::malformed(format!(
                "Product needs {PRODUCT_FIELDS} fields, got {}",
                fields.len()
            )));
        }

        let product_id: i64 = fields[1]
            .parse()
            .map_err(|_| CodecError::malformed(format!("Invalid product id '{}'", fields[1])))?;
        let product_type: i32 = fields[2]
            .parse()
            .map_err(|_| CodecError::malformed(format!("Invalid product type '{}'", fields[2])))?;
        if fields[4].is_empty() {
            return Err(CodecError::malformed("Missing field: supplier address"));
        }
        let supplier = Address::from_hex(fields[4]).map_err(as_malformed)?;

        let delivered_at = optional_timestamp(fields[5])?;
        let customer = match (delivered_at.is_some(), fields[6].is_empty()) {
            (true, false) => Some(Address::from_hex(fields[6]).map_err(as_malformed)?),
            (false, true) => None,
            (true, true) => {
                return Err(CodecError::malformed(
                    "Delivered product is missing the customer address",
                ));
            }
            (false, false) => {
                return Err(CodecError::malformed(
                    "Customer address given for an undelivered product",
                ));
            }
        };

        let mut builder = Product::builder(product_type, product_id, supplier);
        if let Some(created) = optional_timestamp(fields[3])? {
            builder = builder.created_at(created);
        }
        if let Some(delivered) = delivered_at {
            builder = builder.delivered_at(delivered);
        }
        if let Some(customer) = customer {
            builder = builder.customer(customer);
        }
        if let Some(assembled) = optional_timestamp(fields[7])? {
            builder = builder.assembled_at(assembled);
        }
        builder.build()
    }
}

fn optional_timestamp(field: &str) -> Result<Option<DateTime<Utc>>> {
    if field.is_empty() {
        Ok(None)
    } else {
        parse_timestamp(field).map(Some)
    }
}

/// Address problems inside a text record are structural, not domain errors.
fn as_malformed(error: CodecError) -> CodecError {
    match error {
        CodecError::InvalidRecord(message) => CodecError::MalformedRecord(message),
        other => other,
    }
}

/// Builder for [`Product`].
#[derive(Debug, Clone)]
pub struct ProductBuilder {
    product_type: i32,
    product_id: i64,
    supplier: Address,
    created_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    customer: Option<Address>,
    assembled_at: Option<DateTime<Utc>>,
}

impl ProductBuilder {
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn delivered_at(mut self, delivered_at: DateTime<Utc>) -> Self {
        self.delivered_at = Some(delivered_at);
        self
    }

    pub fn customer(mut self, customer: Address) -> Self {
        self.customer = Some(customer);
        self
    }

    /// Set delivery time and customer together.
    pub fn delivered(self, delivered_at: DateTime<Utc>, customer: Address) -> Self {
        self.delivered_at(delivered_at).customer(customer)
    }

    pub fn assembled_at(mut self, assembled_at: DateTime<Utc>) -> Self {
        self.assembled_at = Some(assembled_at);
        self
    }

    /// Validate and build the product.
    ///
    /// # Errors
    /// `InvalidRecord` when only one of delivery time and customer is set,
    /// or when a timestamp year is outside `0000..=9999`.
    pub fn build(self) -> Result<Product> {
        if self.delivered_at.is_some() != self.customer.is_some() {
            return Err(CodecError::invalid(
                "Delivery time and customer address must be set together",
            ));
        }
        Ok(Product {
            product_type: self.product_type,
            product_id: self.product_id,
            created_at: self.created_at.map(record_timestamp).transpose()?,
            supplier: self.supplier,
            delivered_at: self.delivered_at.map(record_timestamp).transpose()?,
            customer: self.customer,
            assembled_at: self.assembled_at.map(record_timestamp).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProductJson {
    product_type: i32,
    #[serde(rename = "ProductID")]
    product_id: i64,
    #[serde(default)]
    date_time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    date_time_delivered: Option<DateTime<Utc>>,
    #[serde(default)]
    date_time_assembled: Option<DateTime<Utc>>,
    supplier_addr: Address,
    #[serde(default)]
    customer_addr: Option<Address>,
}

impl From<Product> for ProductJson {
    fn from(product: Product) -> Self {
        ProductJson {
            product_type: product.product_type,
            product_id: product.product_id,
            date_time_created: product.created_at,
            date_time_delivered: product.delivered_at,
            date_time_assembled: product.assembled_at,
            supplier_addr: product.supplier,
            customer_addr: product.customer,
        }
    }
}

impl TryFrom<ProductJson> for Product {
    type Error = CodecError;

    fn try_from(json: ProductJson) -> Result<Self> {
        let mut builder = Product::builder(json.product_type, json.product_id, json.supplier_addr);
        builder.created_at = json.date_time_created;
        builder.delivered_at = json.date_time_delivered;
        builder.customer = json.customer_addr;
        builder.assembled_at = json.date_time_assembled;
        builder.build()
    }
}

/// Display-only description of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDescription {
    pub name: &'static str,
    pub lines: Vec<String>,
}

impl ProductDescription {
    fn new(product: &Product) -> Self {
        let mut lines = vec![format!("Product ID: {}", product.product_id)];
        match product.created_at {
            Some(created) => lines.push(format!("Created: {}", format_timestamp(&created))),
            None => lines.push("Not yet created".to_string()),
        }
        lines.push(format!("Supplier: {}", product.supplier));
        match (product.delivered_at, product.customer) {
            (Some(delivered), Some(customer)) => {
                lines.push(format!("Delivered: {}", format_timestamp(&delivered)));
                lines.push(format!("Customer: {customer}"));
            }
            _ => lines.push("Not yet delivered".to_string()),
        }
        if let Some(assembled) = product.assembled_at {
            lines.push(format!("Assembled: {}", format_timestamp(&assembled)));
        }
        Self {
            name: product_name(product.product_type),
            lines,
        }
    }
}

impl fmt::Display for ProductDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for line in &self.lines {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// Catalogue name of a product type code.
#[must_use]
pub fn product_name(product_type: i32) -> &'static str {
    match product_type {
        1 => "Radial ball bearing (S/N 90903-63014)",
        2 => "Li-ion battery cell (Type 18650)",
        3 => "Gear assembly, front planetary (S/N 3572073020)",
        _ => "Unknown product type",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ADDRESS_LENGTH;
    use chrono::TimeZone;
    use rstest::rstest;

    fn address(fill: u8) -> Address {
        Address::from_slice(&[fill; ADDRESS_LENGTH]).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_delivered_requires_customer() {
        let result = Product::builder(1, 42, address(1)).delivered_at(at(9)).build();
        assert!(matches!(result, Err(CodecError::InvalidRecord(_))));
    }

    #[test]
    fn test_customer_requires_delivery() {
        let result = Product::builder(1, 42, address(1)).customer(address(2)).build();
        assert!(matches!(result, Err(CodecError::InvalidRecord(_))));
    }

    #[test]
    fn test_text_layout_undelivered() {
        let product = Product::builder(2, 7, address(0xab))
            .created_at(at(8))
            .build()
            .unwrap();
        let expected = format!("P,7,2,2026-10-19T08:00:00Z,{},,,", "ab".repeat(ADDRESS_LENGTH));
        assert_eq!(product.to_text(), expected);
    }

    #[test]
    fn test_text_roundtrip_delivered() {
        let product = Product::builder(3, -5, address(1))
            .created_at(at(8))
            .delivered(at(9), address(2))
            .assembled_at(at(10))
            .build()
            .unwrap();
        let text = product.to_text();
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        assert_eq!(Product::from_fields(&fields).unwrap(), product);
    }

    #[rstest]
    #[case::missing_supplier("P,1,1,,,,,")]
    #[case::bad_id("P,x,1,,{s},,,")]
    #[case::bad_type("P,1,99999999999,,{s},,,")]
    #[case::short_address("P,1,1,,abcd,,,")]
    #[case::customer_without_delivery("P,1,1,,{s},,{s},")]
    #[case::delivery_without_customer("P,1,1,,{s},2026-10-19T09:00:00Z,,")]
    #[case::too_few_fields("P,1,1,,{s}")]
    fn test_malformed_product_text(#[case] template: &str) {
        let text = template.replace("{s}", &"01".repeat(ADDRESS_LENGTH));
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        assert!(matches!(
            Product::from_fields(&fields),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let product = Product::builder(1, 42, address(1)).build().unwrap();
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["ProductType"], 1);
        assert_eq!(value["ProductID"], 42);
        assert_eq!(value["SupplierAddr"], "01".repeat(ADDRESS_LENGTH));
        assert!(value["CustomerAddr"].is_null());
        let parsed: Product = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, product);
    }

    #[test]
    fn test_json_rejects_half_delivery() {
        let json = format!(
            r#"{{"ProductType":1,"ProductID":1,"SupplierAddr":"{}","DateTimeDelivered":"2026-10-19T09:00:00Z"}}"#,
            "01".repeat(ADDRESS_LENGTH)
        );
        assert!(serde_json::from_str::<Product>(&json).is_err());
    }

    #[rstest]
    #[case(1, "Radial ball bearing (S/N 90903-63014)")]
    #[case(2, "Li-ion battery cell (Type 18650)")]
    #[case(3, "Gear assembly, front planetary (S/N 3572073020)")]
    #[case(0, "Unknown product type")]
    #[case(-1, "Unknown product type")]
    fn test_product_names(#[case] code: i32, #[case] expected: &str) {
        assert_eq!(product_name(code), expected);
    }

    #[test]
    fn test_description_lines() {
        let product = Product::builder(1, 42, address(1))
            .delivered(at(9), address(2))
            .build()
            .unwrap();
        let description = product.describe();
        assert_eq!(description.name, "Radial ball bearing (S/N 90903-63014)");
        assert!(description.lines.contains(&"Not yet created".to_string()));
        assert!(description.lines.contains(&"Delivered: 2026-10-19T09:00:00Z".to_string()));
        assert!(description.to_string().starts_with("Radial ball bearing"));
    }
}
