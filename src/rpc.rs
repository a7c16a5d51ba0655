//! JSON-RPC client for an Assets-V2 capable node.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::NodeConfig;
use crate::models::{
    ChainInfo, FundingInput, FundingTx, OutPoint, PubKey, RawOrder, Script, Transaction, TxId, TxOut,
    TxTemplate,
};
use crate::node::RemoteNode;

const BASE_DELAY_MS: u64 = 1000;

pub struct NodeRpc {
    url: String,
    client: reqwest::Client,
    auth: Option<(String, String)>,
    retries: u32,
    base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(alias = "height")]
    blocks: u32,
}

#[derive(Debug, Deserialize)]
struct FundingResponse {
    #[serde(default)]
    version: i32,
    #[serde(rename = "versiongroupid", default)]
    version_group_id: u32,
    #[serde(rename = "expiryheight", default)]
    expiry_height: u32,
    #[serde(rename = "vin", default)]
    inputs: Vec<FundingInputResponse>,
}

#[derive(Debug, Deserialize)]
struct FundingInputResponse {
    txid: TxId,
    vout: u32,
    #[serde(rename = "valueSat")]
    value_sat: u64,
    #[serde(rename = "scriptPubKey", default)]
    script: Script,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<TransactionResponse>,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    txid: TxId,
    #[serde(default)]
    vout: Vec<OutputResponse>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    #[serde(rename = "valueSat")]
    value_sat: u64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    hex: Script,
}

impl NodeRpc {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;
        let auth = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        Ok(Self {
            url: crate::utils::remove_trailing_slash(&config.url),
            client,
            auth,
            retries: config.retries,
            base_delay_ms: BASE_DELAY_MS,
        })
    }

    pub fn with_client(url: &str, client: reqwest::Client) -> Self {
        Self {
            url: crate::utils::remove_trailing_slash(url),
            client,
            auth: None,
            retries: 0,
            base_delay_ms: BASE_DELAY_MS,
        }
    }

    pub fn with_retries(mut self, retries: u32, base_delay_ms: u64) -> Self {
        self.retries = retries;
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_once(&self, body: &Value) -> Result<RpcEnvelope> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await?;
        let status = response.status();
        if matches!(status.as_u16(), 429 | 502 | 503 | 504) {
            return Err(anyhow!("node returned {}", status));
        }
        // Nodes answer RPC-level failures with HTTP 500 and an error body.
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| anyhow!("bad response ({}): {}", status, e))
    }

    /// Call `method`, retrying transport failures. Errors reported by the node
    /// itself are returned on the first attempt.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "assets-v2",
            "method": method,
            "params": params,
        });
        debug!(method, "rpc call");
        let envelope = crate::utils::retry(self.retries, self.base_delay_ms, || self.post_once(&body)).await?;
        if let Some(err) = envelope.error {
            return Err(anyhow!("{} failed: {} (code {})", method, err.message, err.code));
        }
        // CC methods report failures inside the result object.
        if envelope.result.get("result").and_then(Value::as_str) == Some("error") {
            let msg = envelope
                .result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(anyhow!("{} failed: {}", method, msg));
        }
        serde_json::from_value(envelope.result).map_err(|e| anyhow!("{}: unexpected result: {}", method, e))
    }

    async fn funding(&self, method: &str, params: Vec<Value>) -> Result<FundingTx> {
        let resp: FundingResponse = self.call(method, params).await?;
        Ok(FundingTx {
            template: TxTemplate {
                version: resp.version,
                version_group_id: resp.version_group_id,
                expiry_height: resp.expiry_height,
            },
            inputs: resp
                .inputs
                .into_iter()
                .map(|i| FundingInput {
                    outpoint: OutPoint::new(i.txid, i.vout),
                    value: i.value_sat,
                    script: i.script,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl RemoteNode for NodeRpc {
    async fn get_info(&self) -> crate::Result<ChainInfo> {
        let info: InfoResponse = self.call("getinfo", vec![]).await?;
        Ok(ChainInfo { height: info.blocks })
    }

    async fn aggregate_coin_inputs(&self, pubkey: &PubKey, amount: u64) -> crate::Result<FundingTx> {
        Ok(self
            .funding("createtxwithnormalinputs", vec![json!(amount), json!(pubkey.to_hex())])
            .await?)
    }

    async fn aggregate_token_inputs(
        &self,
        token_id: &TxId,
        pubkey: &PubKey,
        amount: u64,
    ) -> crate::Result<FundingTx> {
        Ok(self
            .funding(
                "tokenv2addccinputs",
                vec![json!(token_id.to_hex()), json!(pubkey.to_hex()), json!(amount)],
            )
            .await?)
    }

    async fn fetch_transactions(&self, pubkey: &PubKey, ids: &[TxId]) -> crate::Result<Vec<Transaction>> {
        let mut params = vec![json!(pubkey.to_hex())];
        params.extend(ids.iter().map(|id| json!(id.to_hex())));
        let resp: TransactionsResponse = self.call("gettransactionsmany", params).await?;
        Ok(resp
            .transactions
            .into_iter()
            .map(|tx| Transaction {
                txid: tx.txid,
                outputs: tx
                    .vout
                    .into_iter()
                    .map(|o| TxOut {
                        value: o.value_sat,
                        script: o.script_pub_key.hex,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn query_orders(&self, pubkey: &PubKey, token_id: Option<&TxId>) -> crate::Result<Vec<RawOrder>> {
        let orders: Vec<RawOrder> = match token_id {
            Some(id) => self.call("tokenv2orders", vec![json!(id.to_hex())]).await?,
            None => self.call("mytokenv2orders", vec![json!(pubkey.to_hex())]).await?,
        };
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DexError;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc(server: &MockServer) -> NodeRpc {
        NodeRpc::with_client(&format!("{}/", server.uri()), reqwest::Client::new())
    }

    async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": result,
                "error": null,
                "id": "assets-v2",
            })))
            .mount(server)
            .await;
    }

    fn pk() -> PubKey {
        PubKey::from_hex("02aabbcc").unwrap()
    }

    #[tokio::test]
    async fn test_get_info() {
        let server = MockServer::start().await;
        mock_result(&server, "getinfo", json!({ "blocks": 1234, "connections": 8 })).await;
        let info = rpc(&server).get_info().await.unwrap();
        assert_eq!(info.height, 1234);
    }

    #[tokio::test]
    async fn test_aggregate_coin_inputs() {
        let server = MockServer::start().await;
        let id = TxId::from_internal([3; 32]);
        mock_result(
            &server,
            "createtxwithnormalinputs",
            json!({
                "version": 4,
                "versiongroupid": 0x892f2085u32,
                "expiryheight": 0,
                "vin": [
                    { "txid": id.to_hex(), "vout": 1, "valueSat": 25_000, "scriptPubKey": "76a914" },
                    { "txid": id.to_hex(), "vout": 2, "valueSat": 5_000 },
                ],
            }),
        )
        .await;
        let funding = rpc(&server).aggregate_coin_inputs(&pk(), 20_000).await.unwrap();
        assert_eq!(funding.template.version, 4);
        assert_eq!(funding.template.version_group_id, 0x892f2085);
        assert_eq!(funding.total(), 30_000);
        assert_eq!(funding.inputs[0].outpoint, OutPoint::new(id, 1));
        assert_eq!(funding.inputs[0].script.as_bytes(), &[0x76, 0xa9, 0x14]);
    }

    #[tokio::test]
    async fn test_fetch_transactions() {
        let server = MockServer::start().await;
        let id = TxId::from_internal([5; 32]);
        mock_result(
            &server,
            "gettransactionsmany",
            json!({
                "transactions": [{
                    "txid": id.to_hex(),
                    "vout": [
                        { "valueSat": 100, "scriptPubKey": { "hex": "cc01", "type": "cryptocondition" } },
                        { "valueSat": 0, "scriptPubKey": { "hex": "6a0101" } },
                    ],
                }],
            }),
        )
        .await;
        let txs = rpc(&server).fetch_transactions(&pk(), &[id]).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].txid, id);
        assert_eq!(txs[0].output_value(0), Some(100));
        assert_eq!(txs[0].last_output().unwrap().script.op_return_payload(), Some(&[1u8][..]));
    }

    #[tokio::test]
    async fn test_token_orders_pass_through() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "tokenv2orders",
            json!([{
                "funcid": "s",
                "txid": "ab".repeat(32),
                "vout": 0,
                "amount": 100,
                "price": "0.00000005",
                "tokenid": "cd".repeat(32),
                "origaddress": "RXyz",
                "expiryHeight": 190000,
                "totalrequired": 0,
            }]),
        )
        .await;
        let token = TxId::from_hex(&"cd".repeat(32)).unwrap();
        let orders = rpc(&server).query_orders(&pk(), Some(&token)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].funcid, "s");
        assert_eq!(orders[0].expiry_height, Some(190000));
        assert_eq!(orders[0].extra.get("totalrequired"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_node_error_is_reported() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "tokenv2addccinputs",
            json!({ "result": "error", "error": "not enough tokens" }),
        )
        .await;
        let err = rpc(&server)
            .aggregate_token_inputs(&TxId::from_internal([1; 32]), &pk(), 5)
            .await
            .unwrap_err();
        match err {
            DexError::RemoteRequestFailed(msg) => assert!(msg.contains("not enough tokens")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "result": null,
                "error": { "code": -32601, "message": "Method not found" },
                "id": "assets-v2",
            })))
            .mount(&server)
            .await;
        let err = rpc(&server).get_info().await.unwrap_err();
        assert!(matches!(err, DexError::RemoteRequestFailed(ref m) if m.contains("Method not found")));
    }
}
