use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

/// Build the TLS acceptor for the listener, if TLS is configured.
///
/// TLS is all-or-nothing: with neither path set the daemon serves
/// plaintext and this returns `None`; setting only one of
/// `BUNKD_TLS_CERT`/`BUNKD_TLS_KEY` is a configuration error. The ALPN
/// protocol is pinned to `postgresql` for drivers negotiating direct TLS.
pub fn load_tls_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(cert), Some(key)) => (cert, key),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both BUNKD_TLS_CERT and BUNKD_TLS_KEY must be set, or neither",
            ));
        }
    };

    let mut cert_file = BufReader::new(File::open(cert_path)?);
    let cert_chain = rustls_pemfile::certs(&mut cert_file).collect::<Result<Vec<_>, _>>()?;

    let mut key_file = BufReader::new(File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut key_file)?.ok_or_else(|| {
        io::Error::new(ErrorKind::InvalidInput, "no private key found in key file")
    })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|err| io::Error::new(ErrorKind::InvalidInput, err))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}
