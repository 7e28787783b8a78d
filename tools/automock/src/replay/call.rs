//! The call record: one intercepted invocation and its resolution.

use crate::codec::Codec;
use crate::errors::AutomockError;
use crate::types::{CallArgs, CallKey, CallType, TargetError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// One intercepted invocation.
///
/// `request` and `response` stay encoded; arguments and results are decoded
/// lazily through the codec that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub instance_index: u64,
    pub call_index: Option<u64>,
    pub method: String,
    #[serde(with = "b64")]
    pub request: Vec<u8>,
    #[serde(rename = "type", default)]
    pub call_type: Option<CallType>,
    #[serde(default, with = "b64_opt")]
    pub response: Option<Vec<u8>>,
    #[serde(default)]
    pub is_exception: bool,
}

impl Call {
    pub fn new(
        instance_index: u64,
        call_index: Option<u64>,
        method: impl Into<String>,
        request: Vec<u8>,
    ) -> Self {
        Self {
            instance_index,
            call_index,
            method: method.into(),
            request,
            call_type: None,
            response: None,
            is_exception: false,
        }
    }

    pub fn key(&self) -> CallKey {
        CallKey {
            instance_index: self.instance_index,
            call_index: self.call_index,
        }
    }

    /// Same method and byte-identical request.
    pub fn matches(&self, other: &Call) -> bool {
        self.method == other.method && self.request == other.request
    }

    pub fn is_resolved(&self) -> bool {
        self.call_type.is_some() && self.response.is_some()
    }

    pub fn request_args(&self, codec: &dyn Codec) -> Result<CallArgs, AutomockError> {
        CallArgs::from_request_value(codec.decode(&self.request)?)
    }

    pub fn args(&self, codec: &dyn Codec) -> Result<Vec<Value>, AutomockError> {
        Ok(self.request_args(codec)?.args)
    }

    pub fn kwargs(
        &self,
        codec: &dyn Codec,
    ) -> Result<std::collections::BTreeMap<String, Value>, AutomockError> {
        Ok(self.request_args(codec)?.kwargs)
    }

    /// Decoded `response`. For an exception record this is the encoded error
    /// object, not a return value; check `is_exception` first.
    pub fn result(&self, codec: &dyn Codec) -> Result<Value, AutomockError> {
        let bytes = self
            .response
            .as_deref()
            .ok_or_else(|| AutomockError::Fixture(format!("{self} has no response")))?;
        codec.decode(bytes)
    }

    pub fn exception(&self, codec: &dyn Codec) -> Result<TargetError, AutomockError> {
        serde_json::from_value(self.result(codec)?).map_err(|e| {
            AutomockError::Fixture(format!("{self} holds an unreadable exception: {e}"))
        })
    }

    /// The stored resolution: the returned value, or the error to re-raise.
    pub fn outcome(&self, codec: &dyn Codec) -> Result<Result<Value, TargetError>, AutomockError> {
        if self.is_exception {
            Ok(Err(self.exception(codec)?))
        } else {
            Ok(Ok(self.result(codec)?))
        }
    }

    /// Encodes and stores the target's outcome. Encoding failures carry the
    /// offending record in their context.
    pub fn resolve(
        &mut self,
        call_type: CallType,
        outcome: &Result<Value, TargetError>,
        codec: &dyn Codec,
    ) -> Result<(), AutomockError> {
        let (value, is_exception) = match outcome {
            Ok(value) => (value.clone(), false),
            Err(error) => (
                serde_json::to_value(error).map_err(|e| self.encoding_error(e.to_string()))?,
                true,
            ),
        };
        let response = codec.encode(&value).map_err(|e| AutomockError::Encoding {
            call: self.to_string(),
            source: Box::new(e),
        })?;
        self.call_type = Some(call_type);
        self.response = Some(response);
        self.is_exception = is_exception;
        Ok(())
    }

    pub fn resolve_value(
        &mut self,
        call_type: CallType,
        value: Value,
        codec: &dyn Codec,
    ) -> Result<(), AutomockError> {
        self.resolve(call_type, &Ok(value), codec)
    }

    pub fn resolve_exception(
        &mut self,
        call_type: CallType,
        error: TargetError,
        codec: &dyn Codec,
    ) -> Result<(), AutomockError> {
        self.resolve(call_type, &Err(error), codec)
    }

    fn encoding_error(&self, detail: String) -> AutomockError {
        AutomockError::Encoding {
            call: self.to_string(),
            source: Box::new(AutomockError::Codec(detail)),
        }
    }

    /// First 16 hex chars of the SHA-256 of `request`.
    pub fn request_digest(&self) -> String {
        let hash = Sha256::digest(&self.request);
        hash[..8].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// `method, args, kwargs` for error messages; falls back to the request
    /// digest when the request cannot be decoded.
    pub fn describe(&self, codec: &dyn Codec) -> String {
        match self.request_args(codec) {
            Ok(request) => format!(
                "{}, {}, {}",
                self.method,
                Value::Array(request.args),
                Value::Object(request.kwargs.into_iter().collect())
            ),
            Err(_) => format!("{}, <request sha256:{}>", self.method, self.request_digest()),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Call(key={}, method={})", self.key(), self.method)
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::Call;
    use crate::codec::{Codec, GzipJsonCodec, JsonCodec};
    use crate::errors::AutomockError;
    use crate::types::{CallArgs, CallKey, CallType, TargetError};
    use serde_json::{json, Value};

    fn request(args: &CallArgs) -> Vec<u8> {
        GzipJsonCodec.encode(&args.to_request_value()).expect("encode")
    }

    #[test]
    fn lazily_decodes_arguments() {
        let args = CallArgs::positional([1, 2]).kwarg("scale", 3);
        let call = Call::new(0, Some(4), "add", request(&args));
        assert_eq!(call.key(), CallKey::call(0, 4));
        assert_eq!(call.args(&GzipJsonCodec).expect("args"), vec![json!(1), json!(2)]);
        assert_eq!(call.kwargs(&GzipJsonCodec).expect("kwargs")["scale"], json!(3));
        assert_eq!(call.describe(&GzipJsonCodec), "add, [1,2], {\"scale\":3}");
    }

    #[test]
    fn resolves_exceptions_and_reads_them_back() {
        let mut call = Call::new(1, Some(0), "boom", request(&CallArgs::new()));
        let error = TargetError::new("Timeout").with_arg(2.5);
        call.resolve_exception(CallType::Async, error.clone(), &GzipJsonCodec)
            .expect("resolve");
        assert!(call.is_exception);
        assert_eq!(call.call_type, Some(CallType::Async));
        assert_eq!(call.outcome(&GzipJsonCodec).expect("outcome"), Err(error));
    }

    #[test]
    fn unresolved_record_has_no_result() {
        let call = Call::new(0, None, "__init__", request(&CallArgs::new()));
        assert!(!call.is_resolved());
        assert!(matches!(
            call.result(&GzipJsonCodec),
            Err(AutomockError::Fixture(_))
        ));
    }

    #[test]
    fn encoding_failure_names_the_record() {
        struct Refuse;
        impl Codec for Refuse {
            fn encode(&self, _: &Value) -> Result<Vec<u8>, AutomockError> {
                Err(AutomockError::Codec("nope".to_string()))
            }
            fn decode(&self, _: &[u8]) -> Result<Value, AutomockError> {
                Ok(Value::Null)
            }
        }
        let mut call = Call::new(3, Some(9), "now", Vec::new());
        let err = call
            .resolve(CallType::Sync, &Ok(json!(1)), &Refuse)
            .expect_err("must fail");
        assert!(err.to_string().contains("key=(3, 9)"));
        assert!(call.response.is_none());
    }

    #[test]
    fn serializes_bytes_as_base64() {
        let mut call = Call::new(0, Some(0), "f", vec![1, 2, 3]);
        call.resolve_value(CallType::Sync, json!(5), &JsonCodec)
            .expect("resolve");
        let value = serde_json::to_value(&call).expect("serialize");
        assert_eq!(value["request"], json!("AQID"));
        assert_eq!(value["type"], json!("sync"));
        let back: Call = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, call);
    }

    #[test]
    fn request_digest_is_sixteen_hex_chars() {
        let call = Call::new(0, Some(0), "f", b"abc".to_vec());
        let digest = call.request_digest();
        assert_eq!(digest.len(), 16);
        assert_eq!(digest, "ba7816bf8f01cfea");
    }
}
