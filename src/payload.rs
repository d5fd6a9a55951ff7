//! Walk user arguments, uploading embedded binaries and rewriting them to
//! the server-shaped payload (C2, spec §4.2).

// self
use crate::{_prelude::*, config::ApiInfoEntry, upload::Upload};

/// Prepare `args` for the wire: upload any binary-typed positional argument
/// through `upload`, leaving every other argument untouched. Order is
/// preserved.
pub async fn prepare(
	api_info: &ApiInfoEntry,
	args: Vec<Value>,
	upload: &dyn Upload,
) -> Result<Vec<Value>> {
	let mut prepared = Vec::with_capacity(args.len());

	for (index, arg) in args.into_iter().enumerate() {
		let is_binary = api_info.parameters.get(index).is_some_and(|schema| schema.is_binary());

		if is_binary {
			let Some((bytes, filename)) = extract_binary(&arg) else {
				prepared.push(arg);
				continue;
			};
			let uploaded = upload.upload(bytes, filename).await?;

			prepared.push(serde_json::to_value(uploaded)?);
		} else {
			prepared.push(arg);
		}
	}

	Ok(prepared)
}

/// Pull raw bytes + a filename out of a positional argument that the caller
/// represented as `{ "bytes": [..], "name": ".." }` or a base64 data URI
/// under `{ "data": "data:...;base64,..." , "name": ".." }`. Any other
/// shape is passed through unchanged by the caller (not our job to
/// validate the server-trusted schema, per spec §1 Non-goals).
fn extract_binary(value: &Value) -> Option<(Vec<u8>, String)> {
	let obj = value.as_object()?;
	let name = obj.get("name").and_then(Value::as_str).unwrap_or("blob").to_owned();

	if let Some(bytes) = obj.get("bytes").and_then(Value::as_array) {
		let bytes =
			bytes.iter().filter_map(Value::as_u64).map(|b| b as u8).collect::<Vec<_>>();

		return Some((bytes, name));
	}

	let data = obj.get("data").and_then(Value::as_str)?;
	let encoded = data.split_once("base64,").map(|(_, b)| b).unwrap_or(data);
	let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;

	Some((bytes, name))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{config::ComponentSchema, upload::UploadedFile};
	use serde_json::json;

	struct FakeUpload;
	#[async_trait::async_trait]
	impl Upload for FakeUpload {
		async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<UploadedFile> {
			Ok(UploadedFile {
				path: format!("/tmp/{filename}"),
				orig_name: filename,
				size: bytes.len() as u64,
				mime_type: None,
				is_file: true,
			})
		}
	}

	#[tokio::test]
	async fn non_binary_args_pass_through_untouched() {
		let api_info = ApiInfoEntry {
			fn_index: 0,
			parameters: vec![ComponentSchema { r#type: Some("number".into()) }],
		};
		let prepared = prepare(&api_info, vec![json!(2)], &FakeUpload).await.unwrap();

		assert_eq!(prepared, vec![json!(2)]);
	}

	#[tokio::test]
	async fn binary_args_are_uploaded_and_replaced() {
		let api_info = ApiInfoEntry {
			fn_index: 0,
			parameters: vec![ComponentSchema { r#type: Some("file".into()) }],
		};
		let arg = json!({ "name": "a.txt", "bytes": [104, 105] });
		let prepared = prepare(&api_info, vec![arg], &FakeUpload).await.unwrap();

		assert_eq!(prepared[0]["orig_name"], json!("a.txt"));
		assert_eq!(prepared[0]["is_file"], json!(true));
		assert_eq!(prepared[0]["size"], json!(2));
	}

	#[tokio::test]
	async fn order_is_preserved_across_mixed_args() {
		let api_info = ApiInfoEntry {
			fn_index: 0,
			parameters: vec![
				ComponentSchema { r#type: Some("number".into()) },
				ComponentSchema { r#type: Some("file".into()) },
				ComponentSchema { r#type: Some("number".into()) },
			],
		};
		let args = vec![json!(1), json!({ "name": "b.bin", "bytes": [1, 2, 3] }), json!(3)];
		let prepared = prepare(&api_info, args, &FakeUpload).await.unwrap();

		assert_eq!(prepared[0], json!(1));
		assert_eq!(prepared[1]["orig_name"], json!("b.bin"));
		assert_eq!(prepared[2], json!(3));
	}
}
