pub mod a1;
pub mod auth;
pub mod error;
pub mod types;

pub use auth::ServiceAccountKey;
pub use error::{Result, SheetsError};
pub use types::{cell_text, UpdateValuesResponse, ValueRange};

use std::path::Path;

use reqwest::Method;
use serde::de::DeserializeOwned;
use types::DriveFileList;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

pub struct SheetsClient {
    client: reqwest::Client,
    token: String,
    spreadsheet_id: String,
    base_url: String,
}

impl SheetsClient {
    /// Authenticate with a service-account key file and open the spreadsheet
    /// with the given title (it must be shared with the service account).
    pub async fn connect(auth_file: &Path, title: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let key = ServiceAccountKey::from_file(auth_file)?;
        let token = auth::fetch_access_token(&client, &key).await?;

        let spreadsheet_id = find_spreadsheet_id(&client, &token, title).await?;
        tracing::info!(title, spreadsheet_id = %spreadsheet_id, "Opened spreadsheet");

        Ok(Self {
            client,
            token,
            spreadsheet_id,
            base_url: SHEETS_BASE_URL.to_string(),
        })
    }

    /// Use an already-known spreadsheet id and bearer token.
    pub fn with_token(token: String, spreadsheet_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            spreadsheet_id,
            base_url: SHEETS_BASE_URL.to_string(),
        }
    }

    fn values_url(&self, range: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!(
            "{}/spreadsheets/{}/values",
            self.base_url, self.spreadsheet_id
        ))
        .map_err(|e| SheetsError::InvalidRange(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidRange(format!("cannot append {range} to base URL")))?
            .push(range);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: url::Url,
        body: Option<&ValueRange>,
    ) -> Result<T> {
        let mut request = self.client.request(method, url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// All values of one column, top to bottom, as displayed text. Trailing
    /// empty cells are not returned by the API.
    pub async fn col_values(&self, sheet: &str, column: u32) -> Result<Vec<String>> {
        let range = a1::qualified(sheet, &a1::whole_column(column));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("majorDimension", "COLUMNS");

        let value_range: ValueRange = self.send(Method::GET, url, None).await?;
        tracing::debug!(sheet, column, "Read column");

        Ok(value_range
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(cell_text)
            .collect())
    }

    /// Overwrite `range` (A1 notation, without sheet name) with `rows`.
    pub async fn update(
        &self,
        sheet: &str,
        range: &str,
        rows: Vec<Vec<serde_json::Value>>,
    ) -> Result<UpdateValuesResponse> {
        let qualified = a1::qualified(sheet, range);
        let mut url = self.values_url(&qualified)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRange {
            range: Some(qualified),
            major_dimension: Some("ROWS".to_string()),
            values: rows,
        };

        let response: UpdateValuesResponse = self.send(Method::PUT, url, Some(&body)).await?;
        tracing::debug!(
            sheet,
            range,
            updated_cells = response.updated_cells,
            "Updated range"
        );
        Ok(response)
    }
}

async fn find_spreadsheet_id(client: &reqwest::Client, token: &str, title: &str) -> Result<String> {
    let query = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        title.replace('\\', "\\\\").replace('\'', "\\'"),
        SPREADSHEET_MIME
    );

    let resp = client
        .get(format!("{DRIVE_BASE_URL}/files"))
        .bearer_auth(token)
        .query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SheetsError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let list: DriveFileList = resp.json().await?;
    list.files
        .into_iter()
        .next()
        .map(|f| f.id)
        .ok_or_else(|| SheetsError::NotFound(title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_url_encodes_range_as_one_segment() {
        let client = SheetsClient::with_token("t".to_string(), "abc123".to_string());
        let url = client.values_url("'My sheet'!A:A").unwrap();

        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'My%20sheet'!A:A"
        );
    }

    #[test]
    fn values_url_escapes_slashes_in_sheet_names() {
        let client = SheetsClient::with_token("t".to_string(), "abc123".to_string());
        let url = client.values_url("'a/b'!B2:C3").unwrap();

        assert!(url.path().ends_with("/values/'a%2Fb'!B2:C3"));
    }
}
