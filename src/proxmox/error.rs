//! Tipos de erro para o gateway da API do Proxmox VE.
//!
//! Define [`GatewayError`] com variantes para erros da API, falhas de rede,
//! URLs inválidas e respostas que não puderam ser interpretadas. Nenhuma
//! operação do gateway aborta o processo: toda falha volta como valor.

use thiserror::Error;

/// Erros que podem ocorrer em uma única chamada ao Proxmox VE.
///
/// - [`Api`](GatewayError::Api): o servidor respondeu com status HTTP de erro
/// - [`Network`](GatewayError::Network): falha na camada de rede ou TLS
/// - [`Url`](GatewayError::Url): endpoint não pôde ser montado
/// - [`Parse`](GatewayError::Parse): corpo da resposta fora do formato esperado
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Erro retornado pela API (ex.: 401 token inválido, 500 VM inexistente).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL base ou segmento de caminho inválido.
    #[error("invalid API URL: {0}")]
    Url(String),

    /// Resposta recebida, mas o JSON não corresponde ao contrato.
    #[error("failed to parse API response: {0}")]
    Parse(String),
}
