// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg(feature = "default-rustls-provider")]

use google_cloud_storage_auth::credentials::adc;

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rustls::crypto::{CryptoProvider, KeyProvider};
    use serde_json::json;
    use std::error::Error;

    const CUSTOM_ERROR: &str = "Custom error for the `uses_installed_crypto_provider` test.";

    #[derive(Debug)]
    struct FakeKeyProvider {}

    impl KeyProvider for FakeKeyProvider {
        fn load_private_key(
            &self,
            _key_der: rustls::pki_types::PrivateKeyDer<'static>,
        ) -> std::result::Result<std::sync::Arc<dyn rustls::sign::SigningKey>, rustls::Error>
        {
            Err(rustls::Error::General(CUSTOM_ERROR.to_string()))
        }
    }

    #[tokio::test]
    async fn uses_installed_crypto_provider() -> anyhow::Result<()> {
        // `PrivateKeyDer` requires a provider with a static lifetime.
        static FAKE_KEY_PROVIDER: FakeKeyProvider = FakeKeyProvider {};

        let mut cp = rustls::crypto::aws_lc_rs::default_provider();
        cp.key_provider = &FAKE_KEY_PROVIDER;

        // This can only be called once per process, which is why this test
        // lives in its own binary.
        CryptoProvider::install_default(cp).expect("no provider is installed");

        let key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048)?;
        let contents = json!({
            "type": "service_account",
            "client_email": "test-sa@test-project.iam.gserviceaccount.com",
            "private_key": key.to_pkcs8_pem(LineEnding::LF)?.to_string(),
            // Never contacted, signing fails first.
            "token_uri": "http://127.0.0.1:1/token",
        });
        let creds = adc::service_account_credentials_from_json(&contents.to_string(), None, None)?;

        let err = creds.authorization_header().await.unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        let source = err.source().and_then(|e| e.downcast_ref::<rustls::Error>());
        assert!(
            matches!(source, Some(rustls::Error::General(m)) if m == CUSTOM_ERROR),
            "display={err}, debug={err:?}"
        );
        Ok(())
    }
}
